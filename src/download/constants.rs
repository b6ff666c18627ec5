//! Constants for the download module (timeouts, retry ceiling, sniffing).

use std::time::Duration;

/// Total deadline for one download attempt, body included.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP connect timeout for the download client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-item base used to scale a batch deadline.
pub const BATCH_BASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of concurrent downloads in a batch.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;

/// Attempts per download, the first one included.
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;

/// Number of leading bytes inspected to identify the image format.
pub const SNIFF_LEN: usize = 512;
