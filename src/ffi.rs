//! FFI bindings for healthsync
//!
//! This module provides C-compatible functions for embedding healthsync in a
//! host application. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using
//! `healthsync_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::encoder::RecordEncoder;
use crate::error::SyncError;
use crate::pipeline::normalize_to_json;
use crate::types::RecordConfig;
use crate::upload::UploadClient;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn parse_config(json: &str) -> Result<RecordConfig, SyncError> {
    let config: RecordConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

// ============================================================================
// Record API
// ============================================================================

/// Normalize a raw metric document into the upload JSON body.
///
/// `bag_json` holds metric values keyed by collector name. `config_json` is a
/// record config object: `{"user_id": ..., "date": ..., "difficulty": ...,
/// "duration": ...}`; only `user_id` is required.
///
/// # Safety
/// - `bag_json` and `config_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `healthsync_free_string`.
/// - Returns NULL on error; call `healthsync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn healthsync_normalize(
    bag_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let bag_str = match cstr_to_string(bag_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid bag JSON string pointer");
            return ptr::null_mut();
        }
    };

    let config_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result = parse_config(&config_str)
        .and_then(|config| normalize_to_json(&bag_str, &config, false));
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Check an upload body against the wire contract.
///
/// # Safety
/// - `record_json` must be a valid null-terminated C string.
/// - Returns 0 when valid, -1 otherwise.
/// - On error, call `healthsync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn healthsync_validate(record_json: *const c_char) -> i32 {
    clear_last_error();

    let record_str = match cstr_to_string(record_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid record JSON string pointer");
            return -1;
        }
    };

    match RecordEncoder::decode(&record_str) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Upload a record body to `server_url`, blocking the calling thread.
///
/// Returns the outcome as JSON, e.g. `{"outcome":"success"}` or
/// `{"outcome":"server_rejected","status":500,"body":"..."}`. A failed upload
/// is an outcome, not an error; NULL is returned only when the record or the
/// URL cannot be used.
///
/// # Safety
/// - `record_json` and `server_url` must be valid null-terminated C strings.
/// - Must not be called from inside an async runtime.
/// - Returns a newly allocated string that must be freed with `healthsync_free_string`.
/// - Returns NULL on error; call `healthsync_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn healthsync_upload(
    record_json: *const c_char,
    server_url: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let record_str = match cstr_to_string(record_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid record JSON string pointer");
            return ptr::null_mut();
        }
    };

    let url_str = match cstr_to_string(server_url) {
        Some(s) => s,
        None => {
            set_last_error("Invalid server URL string pointer");
            return ptr::null_mut();
        }
    };

    match upload_blocking(&record_str, &url_str) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn upload_blocking(record_json: &str, server_url: &str) -> Result<String, SyncError> {
    let record = RecordEncoder::decode(record_json)?;
    let client = UploadClient::new(server_url)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SyncError::ClientError(e.to_string()))?;

    let outcome = runtime.block_on(client.submit(record));
    Ok(serde_json::to_string(&outcome)?)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by healthsync functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a healthsync function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn healthsync_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next healthsync call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn healthsync_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the healthsync library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn healthsync_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn scenario_bag() -> CString {
        CString::new(
            r#"{"steps": 8500, "distance": 5400, "sleepDuration": 25200, "activeEnergy": 300,
                "bloodPressure": {"systolic": 118, "diastolic": 76}}"#,
        )
        .unwrap()
    }

    fn scenario_config() -> CString {
        CString::new(r#"{"user_id": "a@b.com", "date": "2025-12-17", "difficulty": "중"}"#).unwrap()
    }

    #[test]
    fn test_ffi_normalize() {
        let bag = scenario_bag();
        let config = scenario_config();

        unsafe {
            let result = healthsync_normalize(bag.as_ptr(), config.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let value: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(value["difficulty"], "medium");
            assert_eq!(value["duration"], 30);
            assert_eq!(value["raw_json"]["sleep_hr"], 7.0);
            assert_eq!(value["raw_json"]["diastolic"], 76.0);

            // The output is itself a valid record
            assert_eq!(healthsync_validate(result), 0);

            healthsync_free_string(result);
        }
    }

    #[test]
    fn test_ffi_normalize_error_handling() {
        let bag = scenario_bag();
        let bad_config = CString::new(r#"{"user_id": "a@b.com", "date": "2025-13-40"}"#).unwrap();

        unsafe {
            let result = healthsync_normalize(bag.as_ptr(), bad_config.as_ptr());
            assert!(result.is_null());

            let error = healthsync_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("2025-13-40"));

            let result = healthsync_normalize(ptr::null(), bad_config.as_ptr());
            assert!(result.is_null());
        }
    }

    #[test]
    fn test_ffi_validate_rejects_incomplete_record() {
        let record = CString::new(r#"{"user_id": "a", "date": "2025-12-17"}"#).unwrap();

        unsafe {
            assert_eq!(healthsync_validate(record.as_ptr()), -1);
            assert!(!healthsync_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_upload_unreachable_server() {
        let bag = scenario_bag();
        let config = scenario_config();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = CString::new(format!("http://127.0.0.1:{port}")).unwrap();

        unsafe {
            let record = healthsync_normalize(bag.as_ptr(), config.as_ptr());
            assert!(!record.is_null());

            let outcome = healthsync_upload(record, url.as_ptr());
            assert!(!outcome.is_null());
            let outcome_str = CStr::from_ptr(outcome).to_str().unwrap();
            assert!(outcome_str.contains("network_failure"));

            healthsync_free_string(outcome);
            healthsync_free_string(record);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = healthsync_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
