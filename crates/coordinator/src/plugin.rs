//! The backup-driver plugin API: a safe [`BackupPlugin`] wrapping one
//! [`BackupCoordinator`], plus a `#[no_mangle] extern "C"` shim on top
//! for hosts that load this as a C-ABI plugin.
//!
//! Global plugin state is unavoidable because the host loads the
//! library through a fixed C-ABI entry-point set, not a constructor it
//! controls. Per the design notes this is encapsulated in exactly one
//! process-scope singleton guarded by one mutex; every exported function
//! acquires it and nothing else in this crate reaches for global state.

use backup_core::{CursorType, Error, Result};
use backup_engine::BitmapEngine;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::coordinator::BackupCoordinator;
use crate::cursor::CursorHandle;

/// Plugin name, as the host expects it.
pub const PLUGIN_NAME: &str = "incremental_bitmap_backup";
/// Plugin version, as the host expects it.
pub const PLUGIN_VERSION: &str = "1.0.0";

/// The safe plugin surface. One instance is installed as the process
/// singleton by [`install_plugin`]; the `extern "C"` functions below
/// marshal raw pointers into calls on it.
pub struct BackupPlugin {
    coordinator: BackupCoordinator,
}

impl BackupPlugin {
    /// `name()`.
    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// `version()`.
    pub fn version(&self) -> &'static str {
        PLUGIN_VERSION
    }

    /// `init(config_blob)`. `config_blob` is a TOML document matching
    /// [`CoordinatorConfig`]'s fields; an empty blob uses defaults.
    pub fn init(config_blob: &str, engine: Arc<BitmapEngine>) -> Result<Self> {
        let config = if config_blob.trim().is_empty() {
            CoordinatorConfig::default()
        } else {
            toml::from_str(config_blob).map_err(|e| Error::InvalidParam(e.to_string()))?
        };
        Ok(BackupPlugin {
            coordinator: BackupCoordinator::new(config, engine)?,
        })
    }

    /// `cleanup()`. Releases no unmanaged resources today (no open file
    /// handles are held across calls); kept as an explicit lifecycle
    /// step to mirror the plugin contract.
    pub fn cleanup(&self) {}

    /// `get_dirty_blocks(w_lo, w_hi, max)`.
    pub fn get_dirty_blocks(&self, w_lo: u64, w_hi: u64, max: usize) -> Vec<u64> {
        let cursor = self.coordinator.create_cursor(
            CursorType::Wal,
            backup_core::Timestamp::new(0),
            backup_core::Timestamp::new(i64::MAX),
            backup_core::WalOffset::new(w_lo),
            backup_core::WalOffset::new(w_hi),
        );
        let batch = self.coordinator.get_next_batch(cursor, max).unwrap_or_default();
        self.coordinator.destroy_cursor(cursor);
        batch.into_iter().map(|b| b.block_id.get()).collect()
    }

    /// `create_incremental_cursor(type, t_lo, t_hi, w_lo, w_hi)`.
    pub fn create_incremental_cursor(
        &self,
        cursor_type: CursorType,
        t_lo: i64,
        t_hi: i64,
        w_lo: u64,
        w_hi: u64,
    ) -> CursorHandle {
        self.coordinator.create_cursor(
            cursor_type,
            backup_core::Timestamp::new(t_lo),
            backup_core::Timestamp::new(t_hi),
            backup_core::WalOffset::new(w_lo),
            backup_core::WalOffset::new(w_hi),
        )
    }

    /// `destroy_cursor(handle)`.
    pub fn destroy_cursor(&self, handle: CursorHandle) {
        self.coordinator.destroy_cursor(handle)
    }

    /// `get_next_batch(handle, max)`.
    pub fn get_next_batch(&self, handle: CursorHandle, max: usize) -> Result<Vec<backup_core::IncrementalBlock>> {
        self.coordinator.get_next_batch(handle, max)
    }

    /// `estimate_backup_size(w_lo, w_hi)`.
    pub fn estimate_backup_size(&self, w_lo: u64, w_hi: u64) -> crate::coordinator::SizeEstimate {
        self.coordinator
            .estimate_size(backup_core::WalOffset::new(w_lo), backup_core::WalOffset::new(w_hi))
    }

    /// `validate_backup(w_lo, w_hi, blocks)`.
    pub fn validate_backup(&self, w_lo: u64, w_hi: u64, blocks: &[backup_core::IncrementalBlock]) -> Result<()> {
        self.coordinator
            .validate_backup(backup_core::WalOffset::new(w_lo), backup_core::WalOffset::new(w_hi), blocks)
    }

    /// `generate_metadata(w_lo, w_hi)`. Emits the archive metadata header
    /// blob for the given WAL-offset range.
    pub fn generate_metadata(&self, w_lo: u64, w_hi: u64) -> Result<Vec<u8>> {
        self.coordinator
            .generate_metadata(backup_core::WalOffset::new(w_lo), backup_core::WalOffset::new(w_hi))
    }

    /// `get_last_error()`.
    pub fn get_last_error(&self) -> Option<String> {
        self.coordinator.last_error()
    }

    /// `get_error_stats()`.
    pub fn get_error_stats(&self) -> (u64, u64) {
        let stats = self.coordinator.error_stats();
        (stats.error_count, stats.retry_count)
    }

    /// `get_stats()`. `(blocks, bytes, duration_ms)` cumulative since this
    /// plugin was initialized — distinct from [`BackupPlugin::get_error_stats`],
    /// which tracks failures rather than backup volume.
    pub fn get_stats(&self) -> (u64, u64, u64) {
        let stats = self.coordinator.backup_stats();
        (stats.blocks, stats.bytes, stats.duration_ms)
    }

    /// `clear_error()`.
    pub fn clear_error(&self) {
        self.coordinator.clear_error()
    }
}

static PLUGIN: OnceCell<Mutex<Option<BackupPlugin>>> = OnceCell::new();

fn plugin_cell() -> &'static Mutex<Option<BackupPlugin>> {
    PLUGIN.get_or_init(|| Mutex::new(None))
}

/// Install `plugin` as the process-wide singleton the `extern "C"`
/// functions below operate on. Intended for a host's `init` call; also
/// used directly by tests that don't go through the FFI shim.
pub fn install_plugin(plugin: BackupPlugin) {
    *plugin_cell().lock() = Some(plugin);
}

/// Remove the installed plugin singleton, if any.
pub fn uninstall_plugin() {
    *plugin_cell().lock() = None;
}

/// `name() -> "incremental_bitmap_backup"`.
///
/// # Safety
/// Returns a pointer to a static, NUL-terminated string; valid for the
/// life of the process.
#[no_mangle]
pub extern "C" fn backup_plugin_name() -> *const c_char {
    static NAME: &[u8] = b"incremental_bitmap_backup\0";
    NAME.as_ptr() as *const c_char
}

/// `version() -> "1.0.0"`.
///
/// # Safety
/// Same contract as [`backup_plugin_name`].
#[no_mangle]
pub extern "C" fn backup_plugin_version() -> *const c_char {
    static VERSION: &[u8] = b"1.0.0\0";
    VERSION.as_ptr() as *const c_char
}

/// `cleanup()`.
#[no_mangle]
pub extern "C" fn backup_plugin_cleanup() {
    if let Some(plugin) = plugin_cell().lock().as_ref() {
        plugin.cleanup();
    }
}

/// `get_error_stats(&errs, &retries) -> 0|err`.
///
/// # Safety
/// `errs` and `retries` must be valid, writable `*mut u64` for the
/// duration of the call.
#[no_mangle]
pub unsafe extern "C" fn backup_plugin_get_error_stats(errs: *mut u64, retries: *mut u64) -> i32 {
    let guard = plugin_cell().lock();
    let Some(plugin) = guard.as_ref() else {
        return Error::NotInitialized.code();
    };
    if errs.is_null() || retries.is_null() {
        return Error::InvalidParam("null output pointer".to_string()).code();
    }
    let (error_count, retry_count) = plugin.get_error_stats();
    unsafe {
        *errs = error_count;
        *retries = retry_count;
    }
    0
}

/// `generate_metadata(w_lo, w_hi, &buf, &len) -> 0|err`. On entry `*len`
/// holds `buf`'s capacity; on success it is overwritten with the number
/// of bytes written to `buf`. Returns [`Error::InvalidParam`]'s code,
/// without writing to `buf`, if the header doesn't fit.
///
/// # Safety
/// `buf` must be a valid, writable buffer of `*len` bytes; `len` must be
/// a valid, readable and writable `*mut usize`.
#[no_mangle]
pub unsafe extern "C" fn backup_plugin_generate_metadata(
    w_lo: u64,
    w_hi: u64,
    buf: *mut u8,
    len: *mut usize,
) -> i32 {
    if buf.is_null() || len.is_null() {
        return Error::InvalidParam("null output pointer".to_string()).code();
    }
    let guard = plugin_cell().lock();
    let Some(plugin) = guard.as_ref() else {
        return Error::NotInitialized.code();
    };
    let metadata = match plugin.generate_metadata(w_lo, w_hi) {
        Ok(bytes) => bytes,
        Err(err) => return err.code(),
    };
    let capacity = unsafe { *len };
    if metadata.len() > capacity {
        return Error::InvalidParam(format!(
            "metadata is {} bytes, buffer holds {capacity}",
            metadata.len()
        ))
        .code();
    }
    unsafe {
        std::ptr::copy_nonoverlapping(metadata.as_ptr(), buf, metadata.len());
        *len = metadata.len();
    }
    0
}

/// `get_stats(&blocks, &bytes, &duration_ms) -> 0|err`.
///
/// # Safety
/// `blocks`, `bytes`, and `duration_ms` must be valid, writable `*mut u64`
/// for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn backup_plugin_get_stats(blocks: *mut u64, bytes: *mut u64, duration_ms: *mut u64) -> i32 {
    let guard = plugin_cell().lock();
    let Some(plugin) = guard.as_ref() else {
        return Error::NotInitialized.code();
    };
    if blocks.is_null() || bytes.is_null() || duration_ms.is_null() {
        return Error::InvalidParam("null output pointer".to_string()).code();
    }
    let (b, by, d) = plugin.get_stats();
    unsafe {
        *blocks = b;
        *bytes = by;
        *duration_ms = d;
    }
    0
}

/// `get_last_error() -> string`. Copies at most `buf_len - 1` bytes plus
/// a NUL terminator into `buf`, returning the number of bytes written
/// (excluding the terminator), or a negative error code.
///
/// # Safety
/// `buf` must be a valid, writable buffer of at least `buf_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn backup_plugin_get_last_error(buf: *mut c_char, buf_len: usize) -> i32 {
    if buf.is_null() || buf_len == 0 {
        return Error::InvalidParam("null or zero-length output buffer".to_string()).code();
    }
    let guard = plugin_cell().lock();
    let Some(plugin) = guard.as_ref() else {
        return Error::NotInitialized.code();
    };
    let message = plugin.get_last_error().unwrap_or_default();
    let bytes = message.as_bytes();
    let n = bytes.len().min(buf_len - 1);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, n);
        *buf.add(n) = 0;
    }
    n as i32
}

/// `clear_error()`.
#[no_mangle]
pub extern "C" fn backup_plugin_clear_error() {
    if let Some(plugin) = plugin_cell().lock().as_ref() {
        plugin.clear_error();
    }
}

/// `init(config_blob, len) -> 0|err`. Builds a fresh [`BitmapEngine`]
/// with default configuration and installs the plugin singleton over
/// it — a host that wants to share an existing engine should use
/// [`install_plugin`] directly from safe Rust instead of this shim.
///
/// # Safety
/// `config_blob` must point to `len` valid, UTF-8 bytes (or be null with
/// `len == 0` for an empty config).
#[no_mangle]
pub unsafe extern "C" fn backup_plugin_init(config_blob: *const c_char, len: usize) -> i32 {
    let blob = if config_blob.is_null() || len == 0 {
        String::new()
    } else {
        let slice = unsafe { std::slice::from_raw_parts(config_blob as *const u8, len) };
        match std::str::from_utf8(slice) {
            Ok(s) => s.to_string(),
            Err(_) => return Error::InvalidParam("config_blob is not valid UTF-8".to_string()).code(),
        }
    };
    match BackupPlugin::init(&blob, Arc::new(BitmapEngine::with_defaults())) {
        Ok(plugin) => {
            install_plugin(plugin);
            0
        }
        Err(err) => err.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_core::BlockId;

    fn fresh_plugin() -> BackupPlugin {
        let engine = Arc::new(BitmapEngine::with_defaults());
        engine.mark_dirty(BlockId::new(1), backup_core::WalOffset::new(100), backup_core::Timestamp::new(100)).unwrap();
        BackupPlugin::init("", engine).unwrap()
    }

    #[test]
    fn name_and_version_match_spec_constants() {
        let plugin = fresh_plugin();
        assert_eq!(plugin.name(), "incremental_bitmap_backup");
        assert_eq!(plugin.version(), "1.0.0");
    }

    #[test]
    fn cursor_roundtrip_through_plugin_surface() {
        let plugin = fresh_plugin();
        let cursor = plugin.create_incremental_cursor(CursorType::Wal, 0, i64::MAX, 0, 1000);
        let batch = plugin.get_next_batch(cursor, 10).unwrap();
        assert_eq!(batch.len(), 1);
        plugin.destroy_cursor(cursor);
    }

    #[test]
    fn ffi_name_and_version_are_nul_terminated_c_strings() {
        unsafe {
            let name = CStr::from_ptr(backup_plugin_name()).to_str().unwrap();
            assert_eq!(name, "incremental_bitmap_backup");
            let version = CStr::from_ptr(backup_plugin_version()).to_str().unwrap();
            assert_eq!(version, "1.0.0");
        }
    }

    #[test]
    fn ffi_get_last_error_without_install_reports_not_initialized() {
        uninstall_plugin();
        let mut buf = [0i8; 64];
        let rc = unsafe { backup_plugin_get_last_error(buf.as_mut_ptr(), buf.len()) };
        assert_eq!(rc, Error::NotInitialized.code());
    }

    #[test]
    fn ffi_get_error_stats_after_install_reflects_plugin_state() {
        install_plugin(fresh_plugin());
        let mut errs: u64 = 0;
        let mut retries: u64 = 0;
        let rc = unsafe { backup_plugin_get_error_stats(&mut errs, &mut retries) };
        assert_eq!(rc, 0);
        uninstall_plugin();
    }

    #[test]
    fn generate_metadata_emits_a_parseable_archive_header() {
        let plugin = fresh_plugin();
        let bytes = plugin.generate_metadata(0, 1000).unwrap();
        assert_eq!(bytes[0..4], *b"TAOS");
    }

    #[test]
    fn get_stats_reflects_blocks_backed_up_through_get_next_batch() {
        let plugin = fresh_plugin();
        assert_eq!(plugin.get_stats(), (0, 0, 0));
        let _ = plugin.get_dirty_blocks(0, 1000, 10);
        let (blocks, _, _) = plugin.get_stats();
        assert_eq!(blocks, 1);
    }

    #[test]
    fn ffi_generate_metadata_writes_header_and_reports_length() {
        install_plugin(fresh_plugin());
        let mut buf = [0u8; 256];
        let mut len = buf.len();
        let rc = unsafe { backup_plugin_generate_metadata(0, 1000, buf.as_mut_ptr(), &mut len) };
        assert_eq!(rc, 0);
        assert_eq!(&buf[0..4], b"TAOS");
        assert!(len > 0 && len <= buf.len());
        uninstall_plugin();
    }

    #[test]
    fn ffi_generate_metadata_without_install_reports_not_initialized() {
        uninstall_plugin();
        let mut buf = [0u8; 256];
        let mut len = buf.len();
        let rc = unsafe { backup_plugin_generate_metadata(0, 1000, buf.as_mut_ptr(), &mut len) };
        assert_eq!(rc, Error::NotInitialized.code());
    }

    #[test]
    fn ffi_generate_metadata_rejects_undersized_buffer() {
        install_plugin(fresh_plugin());
        let mut buf = [0u8; 4];
        let mut len = buf.len();
        let rc = unsafe { backup_plugin_generate_metadata(0, 1000, buf.as_mut_ptr(), &mut len) };
        assert_eq!(rc, Error::InvalidParam(String::new()).code());
        uninstall_plugin();
    }

    #[test]
    fn ffi_get_stats_after_install_reflects_plugin_state() {
        install_plugin(fresh_plugin());
        let mut blocks: u64 = 0;
        let mut bytes: u64 = 0;
        let mut duration_ms: u64 = 0;
        let rc = unsafe { backup_plugin_get_stats(&mut blocks, &mut bytes, &mut duration_ms) };
        assert_eq!(rc, 0);
        uninstall_plugin();
    }
}
