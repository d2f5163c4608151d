// --- Default value functions ---

/// Subdirectory of `data_dir` holding the WhatsApp credentials.
pub(super) const SESSION_DIR_NAME: &str = "wasi-session";

pub(super) fn default_data_dir() -> String {
    "~/.wabridge".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_true() -> bool {
    true
}
pub(super) fn default_api_host() -> String {
    "0.0.0.0".to_string()
}
pub(super) fn default_api_port() -> u16 {
    3000
}
pub(super) fn default_reconnect_delay_secs() -> u64 {
    10
}
pub(super) fn default_device_name() -> String {
    "wabridge".to_string()
}
