//! Application-wide constants for pushline.
//!
//! This module centralizes the product-level numbers that shape intake,
//! registration and reporting behavior. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **Timeouts**: Network request limits
//! - **Intake**: History capacity and deduplication retention
//! - **Reporting**: Statistics interval
//! - **Server**: API defaults

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for backend calls.
///
/// Applies to registration, device-info updates and statistics reports.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Intake
// ============================================================================

/// Maximum number of notification records kept in history.
///
/// When exceeded, the oldest record is evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// How long a dedup key suppresses redelivery of the same notification.
///
/// Push providers retransmit within minutes to hours; a day covers the
/// retransmission horizon without unbounded growth.
pub const DEFAULT_DEDUP_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Reporting
// ============================================================================

/// Interval between periodic statistics reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// Server
// ============================================================================

/// Default backend base URL (API version included).
pub const DEFAULT_BASE_URL: &str = "https://doopush.com/api/v1";

/// Header carrying the application API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// User agent sent with every backend request.
pub const USER_AGENT: &str = concat!("pushline/", env!("CARGO_PKG_VERSION"));
