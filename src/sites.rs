//! # Launch Sites
//!
//! Launch-site catalog parsing. One site per line:
//!
//! ```text
//! Black Rock:40.8837:-119.0589
//! ```
//!
//! Loading runs as an explicit tokio task handed back to the caller.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{AltosError, Result};

/// A named launch site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchSite {
    pub name: String,
    /// Degrees, north positive
    pub latitude: f64,
    /// Degrees, east positive
    pub longitude: f64,
}

/// Parse one `name:lat:lon` catalog line
///
/// Fields past the third are ignored.
///
/// # Errors
///
/// Returns `Parse` for lines with fewer than three fields, an empty name
/// or a coordinate that is not a finite number
pub fn parse_line(line: &str) -> Result<LaunchSite> {
    let mut fields = line.trim().split(':');
    let (name, lat, lon) = match (fields.next(), fields.next(), fields.next()) {
        (Some(name), Some(lat), Some(lon)) => (name.trim(), lat.trim(), lon.trim()),
        _ => return Err(AltosError::Parse(format!("launch site needs name:lat:lon: {:?}", line))),
    };

    if name.is_empty() {
        return Err(AltosError::Parse(format!("launch site without a name: {:?}", line)));
    }

    let coordinate = |text: &str| -> Result<f64> {
        text.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| AltosError::Parse(format!("bad coordinate {:?} in {:?}", text, line)))
    };

    Ok(LaunchSite {
        name: name.to_string(),
        latitude: coordinate(lat)?,
        longitude: coordinate(lon)?,
    })
}

/// Read a whole catalog, skipping blank, comment and malformed lines
///
/// # Errors
///
/// Returns `Io` if reading fails
pub async fn load<R>(reader: R) -> Result<Vec<LaunchSite>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sites = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Ok(site) => sites.push(site),
            Err(e) => debug!("Skipping launch site line: {}", e),
        }
    }

    info!("Loaded {} launch sites", sites.len());
    Ok(sites)
}

/// Load a catalog on a spawned task, then hand the result to `on_complete`
pub fn spawn_load<R, F>(reader: R, on_complete: F) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    F: FnOnce(Result<Vec<LaunchSite>>) + Send + 'static,
{
    tokio::spawn(async move {
        let result = load(reader).await;
        on_complete(result);
    })
}
