use crate::context::Context;
use crate::error::ServerResult;
use crate::http::Response;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression as Level;
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// flate2 level, 0 (none) to 9 (best).
    pub level: u32,
    pub min_size: usize,
    pub skip_types: Vec<String>,
}

impl CompressionConfig {
    fn should_compress(&self, content_type: Option<&str>, content_length: usize) -> bool {
        // Don't compress if content is too small
        if content_length < self.min_size {
            return false;
        }

        match content_type {
            Some(ct) => !self.skip_types.iter().any(|skip| ct.starts_with(skip.as_str())),
            None => true,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: 6,
            min_size: 1024, // Only compress responses larger than 1KB
            skip_types: vec![
                "image/".to_string(),
                "video/".to_string(),
                "audio/".to_string(),
                "application/pdf".to_string(),
                "application/zip".to_string(),
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    fn negotiate(accept: &str) -> Option<Encoding> {
        let accept = accept.to_ascii_lowercase();
        if accept.contains("gzip") {
            Some(Encoding::Gzip)
        } else if accept.contains("deflate") {
            Some(Encoding::Deflate)
        } else {
            None
        }
    }

    fn name(self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }

    fn encode(self, body: &[u8], level: Level) -> std::io::Result<Vec<u8>> {
        match self {
            Encoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), level);
                encoder.write_all(body)?;
                encoder.finish()
            }
            Encoding::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), level);
                encoder.write_all(body)?;
                encoder.finish()
            }
        }
    }
}

/// Compresses response bodies the client said it can decode.
///
/// The encoding is chosen from the request's `Accept-Encoding` before the
/// inner chain runs; the body it returns is then rewritten in place.
#[derive(Clone)]
pub struct Compression {
    config: Arc<CompressionConfig>,
}

impl Compression {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

fn compress(
    config: &CompressionConfig,
    encoding: Option<Encoding>,
    response: &mut Response,
) -> ServerResult<()> {
    if response.get_header("content-encoding").is_some() {
        return Ok(());
    }
    if !config.should_compress(response.get_header("content-type"), response.body.len()) {
        return Ok(());
    }
    // the representation depends on Accept-Encoding even when left plain
    response.add_vary("Accept-Encoding");
    let Some(encoding) = encoding else {
        return Ok(());
    };

    let compressed = encoding.encode(&response.body, Level::new(config.level.min(9)))?;
    response.body = compressed;
    let length = response.body.len().to_string();
    response
        .header("Content-Encoding", encoding.name())
        .header("Content-Length", length);
    Ok(())
}

impl Middleware for Compression {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        let config = Arc::clone(&self.config);
        Box::pin(async move {
            let encoding = ctx.header("accept-encoding").and_then(Encoding::negotiate);
            let mut response = next.handle(ctx).await?;
            compress(&config, encoding, &mut response)?;
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::http::Request;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn large_text() -> String {
        "the quick brown fox jumps over the lazy dog. ".repeat(100)
    }

    async fn run(accept: Option<&str>, body: String, content_type: &'static str) -> Response {
        let mut req = Request::get("/page");
        if let Some(accept) = accept {
            req = req.header("Accept-Encoding", accept);
        }
        Compression::default()
            .call(
                Context::detached(req),
                Next::handler(move |_ctx: Context| {
                    let body = body.clone();
                    async move {
                        let mut response = Response::new(200);
                        response.header("Content-Type", content_type).body(body);
                        Ok(response)
                    }
                }),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn gzip_body_decodes_to_the_original() {
        let original = large_text();
        let response = run(Some("gzip, deflate"), original.clone(), "text/plain").await;

        assert_eq!(response.get_header("Content-Encoding"), Some("gzip"));
        assert_eq!(response.get_header("Vary"), Some("Accept-Encoding"));
        assert!(response.body.len() < original.len());

        let mut decoded = String::new();
        GzDecoder::new(&response.body[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn small_or_binary_or_unrequested_bodies_are_left_alone() {
        let small = run(Some("gzip"), "tiny".into(), "text/plain").await;
        assert!(small.get_header("Content-Encoding").is_none());

        let image = run(Some("gzip"), large_text(), "image/png").await;
        assert!(image.get_header("Content-Encoding").is_none());

        let plain = run(None, large_text(), "text/plain").await;
        assert!(plain.get_header("Content-Encoding").is_none());
        assert_eq!(plain.body_string(), large_text());
        assert_eq!(plain.get_header("Vary"), Some("Accept-Encoding"));
    }

    #[tokio::test]
    async fn vary_from_cors_and_compression_is_merged() {
        use crate::middleware::{Chain, Cors};

        let chain = Chain::new(|_ctx: Context| async { Response::text(large_text()) })
            .with(Cors::default())
            .with(Compression::default());
        let req = Request::get("/page")
            .header("Origin", "https://app.example")
            .header("Accept-Encoding", "gzip");
        let response = chain.call(Context::detached(req)).await.unwrap();

        assert_eq!(response.get_header("Content-Encoding"), Some("gzip"));
        assert_eq!(response.get_header("Vary"), Some("Accept-Encoding, Origin"));
        assert_eq!(response.headers.keys().filter(|k| k.eq_ignore_ascii_case("vary")).count(), 1);
    }
}
