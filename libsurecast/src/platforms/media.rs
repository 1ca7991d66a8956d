//! Media upload ahead of a post
//!
//! An image is downloaded from its URL, base64-encoded and sent to the
//! channel's upload tool as an [`ActionKind::UploadMedia`] action through the
//! dispatcher. The media id that comes back is what [`Content`] carries as its
//! attachment reference.
//!
//! [`ActionKind::UploadMedia`]: crate::types::ActionKind::UploadMedia
//! [`Content`]: crate::types::Content

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;
use tracing::{debug, info};

use crate::dispatcher::RetryingDispatcher;
use crate::error::DispatchError;
use crate::platforms::{classify_status, map_transport_error, read_response, PlatformClient};
use crate::types::{Action, Classification};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Download `image_url` and return its body base64-encoded
///
/// # Errors
///
/// Connection failures and 5xx answers are `RetryableTransport`, a 429 is
/// `RateLimited`, and any other non-2xx status or an empty body is
/// `TerminalRejection`.
pub async fn download_base64(image_url: &str) -> Result<String, DispatchError> {
    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| map_transport_error("media download", e))?;

    let response = client
        .get(image_url)
        .send()
        .await
        .map_err(|e| map_transport_error("media download", e))?;

    if !response.status().is_success() {
        let raw = read_response("media download", response).await?;
        return Err(match classify_status(&raw) {
            Classification::Retryable(reason) => DispatchError::RetryableTransport(reason),
            Classification::RateLimited(reason) => DispatchError::RateLimited(reason),
            _ => DispatchError::TerminalRejection(format!(
                "media download from {} failed with HTTP {}",
                image_url, raw.status
            )),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_transport_error("media download", e))?;
    if bytes.is_empty() {
        return Err(DispatchError::TerminalRejection(format!(
            "media download from {} returned no data",
            image_url
        )));
    }

    debug!("Downloaded {} bytes of media from {}", bytes.len(), image_url);
    Ok(STANDARD.encode(&bytes))
}

/// Upload the image at `image_url` through `client` and return its media id
///
/// # Errors
///
/// `TerminalRejection` when the client takes no media or the upload returns
/// no id. Otherwise the download error, or the dispatcher's last failure.
pub async fn upload_media(
    dispatcher: &RetryingDispatcher,
    client: &dyn PlatformClient,
    image_url: &str,
) -> Result<String, DispatchError> {
    let channel = client.channel();
    if !client.supports_media() {
        return Err(DispatchError::TerminalRejection(format!(
            "{} does not accept media uploads",
            channel
        )));
    }

    let media_data = download_base64(image_url).await?;
    let report = dispatcher
        .dispatch(client, &Action::upload_media(media_data))
        .await?;

    match report.remote_id {
        Some(media_id) => {
            info!("Uploaded media to {} as {}", channel, media_id);
            Ok(media_id)
        }
        None => Err(DispatchError::TerminalRejection(format!(
            "{} accepted the upload without returning a media id",
            channel
        ))),
    }
}
