/// Application name
pub const APP_NAME: &str = "SafeLink";

/// Maximum length of the free-text message attached to an alert
pub const MAX_ALERT_MESSAGE_LEN: usize = 500;

/// Maximum length of a human-readable address
pub const MAX_ADDRESS_LEN: usize = 255;

/// Maximum length of a trusted contact's display name
pub const MAX_CONTACT_NAME_LEN: usize = 100;

/// Phone numbers carry between 8 and 15 digits once separators are stripped
pub const MIN_PHONE_DIGITS: usize = 8;
pub const MAX_PHONE_DIGITS: usize = 15;

/// Community report title bounds (characters, trimmed)
pub const MIN_REPORT_TITLE_LEN: usize = 5;
pub const MAX_REPORT_TITLE_LEN: usize = 200;

/// Community report description bounds (characters, trimmed)
pub const MIN_REPORT_DESCRIPTION_LEN: usize = 10;
pub const MAX_REPORT_DESCRIPTION_LEN: usize = 2000;

/// Mean Earth radius in meters (IUGG)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Nearby query defaults
pub const DEFAULT_NEARBY_RADIUS_M: f64 = 5000.0;
pub const DEFAULT_NEARBY_LIMIT: usize = 50;
pub const MAX_NEARBY_LIMIT: usize = 100;

/// Pagination defaults
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
