//! IBIS-AMI C ABI.
//!
//! This module exports the `AMI_Init()`, `AMI_GetWave()` and `AMI_Close()`
//! functions that an IBIS-AMI host simulator looks up in the model shared
//! library. Each call to `AMI_Init()` creates a new [`Session`], which the host
//! refers to through the opaque memory handle until it calls `AMI_Close()`.
//!
//! All the functions return 1 on success and 0 on failure.

#![allow(non_snake_case)]

use crate::{equalize::ImpulseMatrix, model::Session, tx::ExampleTx};
use anyhow::{Context, Result};
use std::ffi::{c_char, c_long, c_void, CStr, CString};
use std::slice;
use std::sync::Once;

const AMI_SUCCESS: c_long = 1;
const AMI_FAILURE: c_long = 0;

// Memory handle given to the host. The strings handed out to the host point
// into this struct and stay valid until the next call with the same handle.
#[derive(Debug)]
struct AmiHandle {
    session: Session<ExampleTx>,
    params_out: CString,
    msg: CString,
}

impl AmiHandle {
    fn new() -> AmiHandle {
        AmiHandle {
            session: Session::new(ExampleTx),
            params_out: CString::default(),
            msg: CString::default(),
        }
    }

    fn publish(&mut self) {
        self.params_out = to_c_string(self.session.params_out());
        self.msg = to_c_string(self.session.message());
    }
}

fn to_c_string(s: &str) -> CString {
    CString::new(s.replace('\0', " ")).unwrap_or_default()
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};
        // the host may have installed its own subscriber
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .try_init();
    });
}

unsafe fn init_session(
    session: &mut Session<ExampleTx>,
    impulse_matrix: *mut f64,
    row_size: c_long,
    aggressors: c_long,
    sample_interval: f64,
    bit_time: f64,
    ami_parameters_in: *const c_char,
) -> Result<()> {
    if impulse_matrix.is_null() {
        anyhow::bail!("impulse matrix is a null pointer");
    }
    if ami_parameters_in.is_null() {
        anyhow::bail!("AMI parameters string is a null pointer");
    }
    let rows = usize::try_from(row_size).context("negative row size")?;
    let aggressors = usize::try_from(aggressors).context("negative number of aggressors")?;
    let len = aggressors
        .checked_add(1)
        .and_then(|columns| rows.checked_mul(columns))
        .context("impulse matrix is too large")?;
    let params_in = CStr::from_ptr(ami_parameters_in)
        .to_str()
        .context("AMI parameters string is not valid UTF-8")?;
    let data = slice::from_raw_parts_mut(impulse_matrix, len);
    let mut matrix = ImpulseMatrix::new(data, rows, aggressors)?;
    session.init(&mut matrix, sample_interval, bit_time, params_in)
}

/// Initializes the model and equalizes the channel impulse responses.
///
/// A new model instance is allocated and returned through
/// `AMI_memory_handle`, even if the initialization fails, so that the message
/// explaining the failure can be read. The host must release it with
/// [`AMI_Close`].
///
/// # Safety
/// `impulse_matrix` must point to `row_size * (aggressors + 1)` writable
/// doubles. `AMI_parameters_in` must be a null-terminated string.
/// `AMI_memory_handle` must be a valid pointer. `AMI_parameters_out` and `msg`
/// must be valid pointers or null.
#[no_mangle]
pub unsafe extern "C" fn AMI_Init(
    impulse_matrix: *mut f64,
    row_size: c_long,
    aggressors: c_long,
    sample_interval: f64,
    bit_time: f64,
    AMI_parameters_in: *const c_char,
    AMI_parameters_out: *mut *mut c_char,
    AMI_memory_handle: *mut *mut c_void,
    msg: *mut *mut c_char,
) -> c_long {
    init_tracing();
    if AMI_memory_handle.is_null() {
        tracing::error!("AMI_Init called with a null memory handle pointer");
        return AMI_FAILURE;
    }
    let mut handle = Box::new(AmiHandle::new());
    let result = init_session(
        &mut handle.session,
        impulse_matrix,
        row_size,
        aggressors,
        sample_interval,
        bit_time,
        AMI_parameters_in,
    );
    if let Err(err) = &result {
        tracing::error!("AMI_Init failed: {err:#}");
        handle.session.append_message(&format!("ERROR: {err:#}"));
    }
    handle.publish();
    if !AMI_parameters_out.is_null() {
        *AMI_parameters_out = handle.params_out.as_ptr() as *mut c_char;
    }
    if !msg.is_null() {
        *msg = handle.msg.as_ptr() as *mut c_char;
    }
    *AMI_memory_handle = Box::into_raw(handle) as *mut c_void;
    match result {
        Ok(()) => AMI_SUCCESS,
        Err(_) => AMI_FAILURE,
    }
}

/// Filters a waveform block in place with the Tx FIR filter.
///
/// The filter history is carried over between calls. A Tx model does not
/// recover a clock, so `clock_times` is not written.
///
/// # Safety
/// `wave` must point to `wave_size` writable doubles. `AMI_memory` must be a
/// handle returned by [`AMI_Init`] and not yet closed. `AMI_parameters_out`
/// must be a valid pointer or null.
#[no_mangle]
pub unsafe extern "C" fn AMI_GetWave(
    wave: *mut f64,
    wave_size: c_long,
    _clock_times: *mut f64,
    AMI_parameters_out: *mut *mut c_char,
    AMI_memory: *mut c_void,
) -> c_long {
    if AMI_memory.is_null() {
        tracing::error!("AMI_GetWave called with a null memory handle");
        return AMI_FAILURE;
    }
    let handle = &mut *(AMI_memory as *mut AmiHandle);
    let result = (|| -> Result<()> {
        if wave.is_null() {
            anyhow::bail!("wave is a null pointer");
        }
        let len = usize::try_from(wave_size).context("negative wave size")?;
        handle
            .session
            .get_wave(slice::from_raw_parts_mut(wave, len))
    })();
    if !AMI_parameters_out.is_null() {
        *AMI_parameters_out = handle.params_out.as_ptr() as *mut c_char;
    }
    match result {
        Ok(()) => AMI_SUCCESS,
        Err(err) => {
            tracing::error!("AMI_GetWave failed: {err:#}");
            AMI_FAILURE
        }
    }
}

/// Releases a model instance.
///
/// # Safety
/// `AMI_memory` must be a handle returned by [`AMI_Init`] and not yet closed,
/// or null.
#[no_mangle]
pub unsafe extern "C" fn AMI_Close(AMI_memory: *mut c_void) -> c_long {
    if AMI_memory.is_null() {
        return AMI_FAILURE;
    }
    drop(Box::from_raw(AMI_memory as *mut AmiHandle));
    AMI_SUCCESS
}

#[cfg(test)]
mod test {
    use super::*;
    use std::ptr;

    struct Outputs {
        ret: c_long,
        handle: *mut c_void,
        params_out: String,
        msg: String,
    }

    unsafe fn call_init(
        matrix: &mut [f64],
        rows: c_long,
        aggressors: c_long,
        bit_time: f64,
        params: &str,
    ) -> Outputs {
        let params_in = CString::new(params).unwrap();
        let mut params_out: *mut c_char = ptr::null_mut();
        let mut handle: *mut c_void = ptr::null_mut();
        let mut msg: *mut c_char = ptr::null_mut();
        let ret = AMI_Init(
            matrix.as_mut_ptr(),
            rows,
            aggressors,
            1.0,
            bit_time,
            params_in.as_ptr(),
            &mut params_out,
            &mut handle,
            &mut msg,
        );
        assert!(!handle.is_null());
        Outputs {
            ret,
            handle,
            params_out: CStr::from_ptr(params_out).to_str().unwrap().to_string(),
            msg: CStr::from_ptr(msg).to_str().unwrap().to_string(),
        }
    }

    #[test]
    fn init_getwave_close() {
        let mut matrix = vec![0.0; 16];
        matrix[0] = 1.0;
        matrix[8] = 1.0;
        unsafe {
            let out = call_init(&mut matrix, 8, 1, 2.0, "(example_tx (tx_tap_nm1 3))");
            assert_eq!(out.ret, 1);
            assert_eq!(out.msg, "Initializing Tx...\n\n");
            assert!(out.params_out.contains("(taps[2] 3)"));
            // both columns equalized
            assert_eq!(&matrix[..8], &matrix[8..]);
            assert_eq!(matrix[2], 24.0 * 0.0407);

            let mut wave = vec![0.0; 8];
            wave[0] = 1.0;
            let mut clocks = vec![0.0; 5];
            let mut params_out: *mut c_char = ptr::null_mut();
            let ret = AMI_GetWave(
                wave.as_mut_ptr(),
                8,
                clocks.as_mut_ptr(),
                &mut params_out,
                out.handle,
            );
            assert_eq!(ret, 1);
            assert_eq!(wave, matrix[..8].to_vec());
            assert_eq!(clocks, vec![0.0; 5]);
            assert_eq!(AMI_Close(out.handle), 1);
        }
    }

    #[test]
    fn init_failure_reports_message() {
        let mut matrix = vec![0.5; 4];
        unsafe {
            let out = call_init(&mut matrix, 4, 0, 2.0, "(example_tx (tx_tap_nm1 3)");
            assert_eq!(out.ret, 0);
            assert!(out.msg.starts_with("Initializing Tx...\nERROR: "));
            assert_eq!(matrix, vec![0.5; 4]);
            let mut wave = vec![1.0; 4];
            let ret = AMI_GetWave(
                wave.as_mut_ptr(),
                4,
                ptr::null_mut(),
                ptr::null_mut(),
                out.handle,
            );
            assert_eq!(ret, 0);
            assert_eq!(AMI_Close(out.handle), 1);
        }
    }

    #[test]
    fn init_rejects_tap_code_overflow() {
        let mut matrix = vec![0.0, 1.0, 0.0, 0.0];
        unsafe {
            let out = call_init(
                &mut matrix,
                4,
                0,
                2.0,
                "(example_tx (tx_tap_np1 9223372036854775807) (tx_tap_nm1 1))",
            );
            assert_eq!(out.ret, 0);
            assert!(out.msg.contains("ERROR: tap codes overflow"));
            assert_eq!(matrix, vec![0.0, 1.0, 0.0, 0.0]);
            assert_eq!(AMI_Close(out.handle), 1);
        }
    }

    #[test]
    fn init_rejects_bad_shape() {
        let mut matrix = vec![0.0; 4];
        unsafe {
            let out = call_init(&mut matrix, -1, 0, 2.0, "(example_tx)");
            assert_eq!(out.ret, 0);
            assert_eq!(AMI_Close(out.handle), 1);
            let out = call_init(&mut matrix, 4, 0, 0.5, "(example_tx)");
            assert_eq!(out.ret, 0);
            assert_eq!(AMI_Close(out.handle), 1);
        }
    }

    #[test]
    fn null_pointers() {
        unsafe {
            let params_in = CString::new("(example_tx)").unwrap();
            let mut matrix = vec![0.0; 4];
            let ret = AMI_Init(
                matrix.as_mut_ptr(),
                4,
                0,
                1.0,
                1.0,
                params_in.as_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            );
            assert_eq!(ret, 0);
            assert_eq!(AMI_Close(ptr::null_mut()), 0);
            assert_eq!(
                AMI_GetWave(
                    ptr::null_mut(),
                    0,
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut()
                ),
                0
            );
        }
    }
}
