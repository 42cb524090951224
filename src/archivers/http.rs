//! Direct media links over HTTP

use crate::backends::{ArchiveOutcome, Archiver};
use crate::config::{HttpArchiverConfig, RetryConfig};
use crate::context::ArchivingContext;
use crate::error::{Error, Result};
use crate::media::Media;
use crate::metadata::Metadata;
use crate::orchestrator::assert_valid_url;
use crate::retry::with_retry;
use crate::utils::{extension_for_content_type, extract_filename_from_response};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Downloads URLs that point straight at an image, video, or audio file
///
/// Anything else (HTML pages, JSON APIs) is declined so later archivers can
/// try it.
pub struct HttpArchiver {
    client: Client,
    max_size_bytes: Option<u64>,
    retry: RetryConfig,
}

impl HttpArchiver {
    /// Build the archiver and its HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the client cannot be constructed.
    pub fn new(config: HttpArchiverConfig, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .redirect(redirect_policy())
            .build()?;
        Ok(Self {
            client,
            max_size_bytes: config.max_size_bytes,
            retry,
        })
    }

    async fn fetch(&self, url: &str, tmp_dir: &Path) -> Result<Option<Metadata>> {
        let client = &self.client;
        let response = with_retry(&self.retry, "http_archiver download", move || async move {
            client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(Error::from)
        })
        .await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_media_content_type(&content_type) {
            tracing::debug!(url, content_type = %content_type, "Not a direct media link");
            return Ok(None);
        }

        if let (Some(limit), Some(len)) = (self.max_size_bytes, response.content_length())
            && len > limit
        {
            return Err(too_large(len, limit));
        }

        let mut filename = extract_filename_from_response(&response, url);
        if Path::new(&filename).extension().is_none()
            && let Some(ext) = extension_for_content_type(&content_type)
        {
            filename.push_str(ext);
        }

        tokio::fs::create_dir_all(tmp_dir).await?;
        let path = tmp_dir.join(&filename);
        let bytes = match write_limited(response.bytes_stream(), &path, self.max_size_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    tracing::debug!(file = %path.display(), error = %rm, "Could not remove partial download");
                }
                return Err(e);
            }
        };

        tracing::info!(url, file = %path.display(), bytes, "Downloaded media");

        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let mut item = Metadata::new(url);
        item.set_title(filename)
            .add_media(Media::new(path).with_content_type(essence))
            .success(self.name());
        Ok(Some(item))
    }
}

/// Follow redirects only to URLs that would pass validation themselves
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| match check_redirect(attempt.url(), attempt.previous().len()) {
        Ok(()) => attempt.follow(),
        Err(reason) => attempt.error(reason),
    })
}

/// `hops` counts the URLs already visited, the original request included
fn check_redirect(target: &Url, hops: usize) -> std::result::Result<(), String> {
    if hops > MAX_REDIRECTS {
        return Err(format!("too many redirects (more than {})", MAX_REDIRECTS));
    }
    assert_valid_url(target.as_str()).map_err(|e| format!("redirect to {} refused: {}", target, e))
}

/// Copy `body` into a new file at `path`, stopping once more than `limit`
/// bytes have arrived
///
/// Returns the number of bytes written. The file is left behind on error.
async fn write_limited<S, B, E>(body: S, path: &Path, limit: Option<u64>) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
{
    let mut body = std::pin::pin!(body);
    let mut file = tokio::fs::File::create(path).await?;
    let mut total = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Into::<Error>::into)?;
        let chunk = chunk.as_ref();
        total += chunk.len() as u64;
        if let Some(limit) = limit
            && total > limit
        {
            return Err(too_large(total, limit));
        }
        file.write_all(chunk).await?;
    }
    file.flush().await?;
    Ok(total)
}

fn too_large(bytes: u64, limit: u64) -> Error {
    Error::backend(
        "http_archiver",
        format!("response of {} bytes exceeds limit of {}", bytes, limit),
    )
}

fn is_media_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("image/") || ct.starts_with("video/") || ct.starts_with("audio/")
}

/// Drop `utm_*` tracking parameters; leaves unparseable URLs untouched
fn strip_tracking_params(url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    if parsed.query().is_none() {
        return url.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.to_string()
}

#[async_trait]
impl Archiver for HttpArchiver {
    fn name(&self) -> &str {
        "http_archiver"
    }

    fn sanitize_url(&self, url: &str) -> String {
        strip_tracking_params(url)
    }

    async fn download(&self, item: &Metadata, ctx: &ArchivingContext) -> ArchiveOutcome {
        ArchiveOutcome::from_result(self.fetch(item.get_url(), &ctx.tmp_dir).await)
    }
}
