// ============================================================================
// ONNX SEGMENTER: salient-object cut-out through a runtime-loaded ONNX Runtime
// ============================================================================
//
// Uses `libloading` to dynamically load onnxruntime.dll / libonnxruntime.so
// at runtime so the binary has NO compile-time dependency on ONNX Runtime.
// Paths come from the settings file (onnx_runtime_path / segmentation_model_path).
//
// Model contract (U²-Net family): one float input [1, 3, H, W] normalized with
// ImageNet statistics, first output [1, 1, H, W] holding a saliency map.

#![allow(unsafe_op_in_unsafe_fn)]

use image::{GrayImage, RgbImage, RgbaImage, imageops};
use std::ffi::{CStr, CString, c_char, c_void};
use std::marker::PhantomData;
use std::path::Path;

use super::Segmenter;
use crate::error::EditError;

/// Errors that can occur during ONNX Runtime operations.
#[derive(Debug)]
pub enum OnnxError {
    DllNotFound(String),
    DllLoadFailed(String),
    ModelNotFound(String),
    ModelLoadFailed(String),
    ApiInitFailed(String),
    SessionCreateFailed(String),
    InferenceFailed(String),
    InvalidOutput(String),
}

impl std::fmt::Display for OnnxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnnxError::DllNotFound(p) => write!(f, "ONNX Runtime library not found: {}", p),
            OnnxError::DllLoadFailed(e) => write!(f, "Failed to load ONNX Runtime: {}", e),
            OnnxError::ModelNotFound(p) => write!(f, "ONNX model file not found: {}", p),
            OnnxError::ModelLoadFailed(e) => write!(f, "Failed to load ONNX model: {}", e),
            OnnxError::ApiInitFailed(e) => write!(f, "ONNX Runtime API init failed: {}", e),
            OnnxError::SessionCreateFailed(e) => write!(f, "Failed to create ONNX session: {}", e),
            OnnxError::InferenceFailed(e) => write!(f, "ONNX inference failed: {}", e),
            OnnxError::InvalidOutput(e) => write!(f, "Invalid ONNX output: {}", e),
        }
    }
}

impl From<OnnxError> for EditError {
    fn from(e: OnnxError) -> Self {
        EditError::Segmentation(e.to_string())
    }
}

// --- ONNX Runtime C API types --------------------------------------
// Opaque handles mirror onnxruntime_c_api.h; they are only ever used
// behind raw pointers.

#[repr(C)]
struct OrtEnv {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtSession {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtSessionOptions {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtValue {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtMemoryInfo {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtStatus {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtRunOptions {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtAllocator {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtTensorTypeAndShapeInfo {
    _private: [u8; 0],
}
#[repr(C)]
struct OrtTypeInfo {
    _private: [u8; 0],
}

/// ORT API version we target (ONNX Runtime 1.16+).
const ORT_API_VERSION: u32 = 18;

/// Input side used when the model reports dynamic dimensions.
const DEFAULT_MODEL_SIZE: u32 = 320;

/// ORT_ENABLE_ALL
const GRAPH_OPT_ALL: u32 = 99;

#[allow(dead_code)]
#[repr(u32)]
enum OrtLoggingLevel {
    Verbose = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

#[allow(dead_code)]
#[repr(u32)]
enum ONNXTensorElementDataType {
    Undefined = 0,
    Float = 1,
}

#[allow(dead_code)]
#[repr(i32)]
enum OrtAllocatorType {
    Invalid = -1,
    DeviceAllocator = 0,
    ArenaAllocator = 1,
}

#[allow(dead_code)]
#[repr(i32)]
enum OrtMemType {
    CpuInput = -2,
    CpuOutput = -1,
    Default = 0,
}

type CreateEnvFn = unsafe extern "C" fn(
    log_level: OrtLoggingLevel,
    logid: *const c_char,
    out: *mut *mut OrtEnv,
) -> *mut OrtStatus;
type CreateSessionOptionsFn = unsafe extern "C" fn(out: *mut *mut OrtSessionOptions) -> *mut OrtStatus;
/// `model_path` is `wchar_t*` on Windows and `char*` elsewhere.
type CreateSessionFn = unsafe extern "C" fn(
    env: *const OrtEnv,
    model_path: *const c_void,
    options: *const OrtSessionOptions,
    out: *mut *mut OrtSession,
) -> *mut OrtStatus;
type RunFn = unsafe extern "C" fn(
    session: *mut OrtSession,
    run_options: *const OrtRunOptions,
    input_names: *const *const c_char,
    inputs: *const *const OrtValue,
    input_count: usize,
    output_names: *const *const c_char,
    output_count: usize,
    outputs: *mut *mut OrtValue,
) -> *mut OrtStatus;
type SetSessionGraphOptimizationLevelFn =
    unsafe extern "C" fn(options: *mut OrtSessionOptions, level: u32) -> *mut OrtStatus;
type SetIntraOpNumThreadsFn =
    unsafe extern "C" fn(options: *mut OrtSessionOptions, threads: i32) -> *mut OrtStatus;
type SessionGetInputTypeInfoFn = unsafe extern "C" fn(
    session: *const OrtSession,
    index: usize,
    type_info: *mut *mut OrtTypeInfo,
) -> *mut OrtStatus;
type SessionGetNameFn = unsafe extern "C" fn(
    session: *const OrtSession,
    index: usize,
    allocator: *mut OrtAllocator,
    out: *mut *mut c_char,
) -> *mut OrtStatus;
type CreateTensorWithDataAsOrtValueFn = unsafe extern "C" fn(
    info: *const OrtMemoryInfo,
    data: *mut c_void,
    data_len: usize,
    shape: *const i64,
    shape_len: usize,
    element_type: ONNXTensorElementDataType,
    out: *mut *mut OrtValue,
) -> *mut OrtStatus;
type GetTensorMutableDataFn = unsafe extern "C" fn(value: *mut OrtValue, out: *mut *mut c_void) -> *mut OrtStatus;
type CastTypeInfoToTensorInfoFn = unsafe extern "C" fn(
    type_info: *const OrtTypeInfo,
    out: *mut *const OrtTensorTypeAndShapeInfo,
) -> *mut OrtStatus;
type GetDimensionsCountFn =
    unsafe extern "C" fn(info: *const OrtTensorTypeAndShapeInfo, out: *mut usize) -> *mut OrtStatus;
type GetDimensionsFn = unsafe extern "C" fn(
    info: *const OrtTensorTypeAndShapeInfo,
    dim_values: *mut i64,
    dim_values_length: usize,
) -> *mut OrtStatus;
type GetTensorTypeAndShapeFn = unsafe extern "C" fn(
    value: *const OrtValue,
    out: *mut *mut OrtTensorTypeAndShapeInfo,
) -> *mut OrtStatus;
type CreateCpuMemoryInfoFn = unsafe extern "C" fn(
    alloc_type: OrtAllocatorType,
    mem_type: OrtMemType,
    out: *mut *mut OrtMemoryInfo,
) -> *mut OrtStatus;
type AllocatorFreeFn = unsafe extern "C" fn(allocator: *mut OrtAllocator, ptr: *mut c_void) -> *mut OrtStatus;
type GetAllocatorWithDefaultOptionsFn = unsafe extern "C" fn(out: *mut *mut OrtAllocator) -> *mut OrtStatus;
type GetErrorMessageFn = unsafe extern "C" fn(status: *const OrtStatus) -> *const c_char;
type ReleaseFn<T> = unsafe extern "C" fn(handle: *mut T);

/// OrtApiBase - the entry point struct returned by OrtGetApiBase()
#[repr(C)]
struct OrtApiBase {
    get_api: unsafe extern "C" fn(version: u32) -> *const c_void,
    get_version_string: unsafe extern "C" fn() -> *const c_char,
}

/// The OrtApi function table. Entries are fetched by their position in the
/// struct as laid out in onnxruntime_c_api.h.
struct OrtApi {
    raw: *const c_void,
}

impl OrtApi {
    unsafe fn get_fn<T>(&self, index: usize) -> T {
        let table = self.raw as *const *const c_void;
        let fn_ptr = *table.add(index);
        std::mem::transmute_copy(&fn_ptr)
    }
}

macro_rules! ort_fns {
    ($($name:ident: $ty:ty = $index:expr;)*) => {
        impl OrtApi {
            $(
                fn $name(&self) -> $ty {
                    unsafe { self.get_fn($index) }
                }
            )*
        }
    };
}

ort_fns! {
    get_error_message: GetErrorMessageFn = 2;
    create_env: CreateEnvFn = 3;
    create_session: CreateSessionFn = 7;
    run: RunFn = 9;
    create_session_options: CreateSessionOptionsFn = 10;
    set_session_graph_optimization_level: SetSessionGraphOptimizationLevelFn = 23;
    set_intra_op_num_threads: SetIntraOpNumThreadsFn = 24;
    session_get_input_type_info: SessionGetInputTypeInfoFn = 33;
    session_get_input_name: SessionGetNameFn = 36;
    session_get_output_name: SessionGetNameFn = 37;
    create_tensor_with_data: CreateTensorWithDataAsOrtValueFn = 49;
    get_tensor_mutable_data: GetTensorMutableDataFn = 51;
    cast_type_info_to_tensor_info: CastTypeInfoToTensorInfoFn = 55;
    get_dimensions_count: GetDimensionsCountFn = 61;
    get_dimensions: GetDimensionsFn = 62;
    get_tensor_type_and_shape: GetTensorTypeAndShapeFn = 65;
    create_cpu_memory_info: CreateCpuMemoryInfoFn = 69;
    allocator_free: AllocatorFreeFn = 76;
    get_allocator_with_default_options: GetAllocatorWithDefaultOptionsFn = 78;
    release_env: ReleaseFn<OrtEnv> = 92;
    release_status: ReleaseFn<OrtStatus> = 93;
    release_memory_info: ReleaseFn<OrtMemoryInfo> = 94;
    release_session: ReleaseFn<OrtSession> = 95;
    release_value: ReleaseFn<OrtValue> = 96;
    release_type_info: ReleaseFn<OrtTypeInfo> = 98;
    release_tensor_type_and_shape_info: ReleaseFn<OrtTensorTypeAndShapeInfo> = 99;
    release_session_options: ReleaseFn<OrtSessionOptions> = 100;
}

/// Convert an OrtStatus into a Result, releasing the status.
unsafe fn status_to_result(api: &OrtApi, status: *mut OrtStatus) -> Result<(), String> {
    if status.is_null() {
        return Ok(());
    }
    let msg_ptr = (api.get_error_message())(status);
    let msg = if msg_ptr.is_null() {
        "Unknown error".to_string()
    } else {
        CStr::from_ptr(msg_ptr).to_string_lossy().into_owned()
    };
    (api.release_status())(status);
    Err(msg)
}

/// Validate that an ONNX library/model path is safe to load:
/// - Must be an absolute path
/// - Must not contain `..` components
/// - Must have the correct file extension for the expected type
pub fn validate_onnx_path(path: &str, for_library: bool) -> Result<(), OnnxError> {
    use std::path::Component;
    let p = Path::new(path);

    if path.is_empty() {
        return Err(if for_library {
            OnnxError::DllNotFound("path is empty".to_string())
        } else {
            OnnxError::ModelNotFound("path is empty".to_string())
        });
    }
    if !p.is_absolute() {
        return Err(OnnxError::DllLoadFailed(format!("'{}' is not an absolute path", path)));
    }
    if p.components().any(|c| c == Component::ParentDir) {
        return Err(OnnxError::DllLoadFailed(
            "ONNX path must not contain '..' components".to_string(),
        ));
    }

    let ext = p
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if for_library {
        if !["dll", "so", "dylib"].contains(&ext.as_str()) {
            return Err(OnnxError::DllLoadFailed(format!(
                "Expected a .dll/.so/.dylib file, got '.{}'",
                ext
            )));
        }
    } else if ext != "onnx" {
        return Err(OnnxError::ModelLoadFailed(format!(
            "Expected a .onnx model file, got '.{}'",
            ext
        )));
    }
    Ok(())
}

// ============================================================================
// RUNTIME
// ============================================================================

/// A loaded ONNX Runtime library. Handles borrow it so they are always
/// released before the library is unloaded.
struct OrtRuntime {
    api: OrtApi,
    _lib: libloading::Library,
}

/// An ORT handle released on drop.
struct Owned<'rt, T> {
    ptr: *mut T,
    release: ReleaseFn<T>,
    _rt: PhantomData<&'rt OrtRuntime>,
}

impl<'rt, T> Owned<'rt, T> {
    fn new(_rt: &'rt OrtRuntime, ptr: *mut T, release: ReleaseFn<T>) -> Self {
        Self {
            ptr,
            release,
            _rt: PhantomData,
        }
    }
}

impl<T> Drop for Owned<'_, T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.release)(self.ptr) }
        }
    }
}

/// Raw saliency map as produced by the model.
struct RawMask {
    data: Vec<f32>,
    width: u32,
    height: u32,
}

impl OrtRuntime {
    fn load(library_path: &str) -> Result<Self, OnnxError> {
        validate_onnx_path(library_path, true)?;
        if !Path::new(library_path).exists() {
            return Err(OnnxError::DllNotFound(library_path.to_string()));
        }

        unsafe {
            let lib = libloading::Library::new(library_path)
                .map_err(|e| OnnxError::DllLoadFailed(e.to_string()))?;
            let get_api_base: unsafe extern "C" fn() -> *const OrtApiBase = *lib
                .get(b"OrtGetApiBase")
                .map_err(|e| OnnxError::DllLoadFailed(format!("Symbol not found: {}", e)))?;

            let api_base = get_api_base();
            if api_base.is_null() {
                return Err(OnnxError::ApiInitFailed("OrtGetApiBase returned null".to_string()));
            }
            let version_ptr = ((*api_base).get_version_string)();
            if !version_ptr.is_null() {
                crate::log_info!(
                    "ONNX Runtime {} loaded",
                    CStr::from_ptr(version_ptr).to_string_lossy()
                );
            }
            let raw = ((*api_base).get_api)(ORT_API_VERSION);
            if raw.is_null() {
                return Err(OnnxError::ApiInitFailed(format!(
                    "OrtGetApi({}) returned null (runtime older than 1.16?)",
                    ORT_API_VERSION
                )));
            }
            Ok(Self {
                api: OrtApi { raw },
                _lib: lib,
            })
        }
    }

    fn check(&self, status: *mut OrtStatus) -> Result<(), String> {
        unsafe { status_to_result(&self.api, status) }
    }

    /// Side of the square model input, if the model declares one.
    fn input_size(&self, session: &Owned<'_, OrtSession>) -> Option<u32> {
        let api = &self.api;
        unsafe {
            let mut type_info: *mut OrtTypeInfo = std::ptr::null_mut();
            self.check((api.session_get_input_type_info())(session.ptr, 0, &mut type_info))
                .ok()?;
            let type_info = Owned::new(self, type_info, api.release_type_info());
            if type_info.ptr.is_null() {
                return None;
            }
            // Owned by type_info.
            let mut tensor_info: *const OrtTensorTypeAndShapeInfo = std::ptr::null();
            self.check((api.cast_type_info_to_tensor_info())(type_info.ptr, &mut tensor_info))
                .ok()?;
            if tensor_info.is_null() {
                return None;
            }
            let dims = self.dimensions(tensor_info).ok()?;
            let (h, w) = spatial_dims(&dims)?;
            Some(h.max(w))
        }
    }

    unsafe fn dimensions(&self, info: *const OrtTensorTypeAndShapeInfo) -> Result<Vec<i64>, String> {
        let api = &self.api;
        let mut count: usize = 0;
        self.check((api.get_dimensions_count())(info, &mut count))?;
        let mut dims = vec![0i64; count];
        self.check((api.get_dimensions())(info, dims.as_mut_ptr(), count))?;
        Ok(dims)
    }

    unsafe fn io_name(
        &self,
        session: &Owned<'_, OrtSession>,
        allocator: *mut OrtAllocator,
        output: bool,
    ) -> Result<CString, OnnxError> {
        let api = &self.api;
        let getter = if output {
            api.session_get_output_name()
        } else {
            api.session_get_input_name()
        };
        let mut name_ptr: *mut c_char = std::ptr::null_mut();
        self.check(getter(session.ptr, 0, allocator, &mut name_ptr))
            .map_err(|e| OnnxError::SessionCreateFailed(format!("Get tensor name: {}", e)))?;
        if name_ptr.is_null() {
            return Err(OnnxError::SessionCreateFailed("model has an unnamed tensor".to_string()));
        }
        let name = CStr::from_ptr(name_ptr).to_owned();
        let _ = self.check((api.allocator_free())(allocator, name_ptr as *mut c_void));
        Ok(name)
    }

    /// Run the model on `input` and return its first output's first channel.
    fn run_mask(&self, model_path: &str, input: &RgbImage) -> Result<RawMask, OnnxError> {
        let api = &self.api;
        unsafe {
            let mut env: *mut OrtEnv = std::ptr::null_mut();
            let log_id = c"EpanouiDent";
            self.check((api.create_env())(OrtLoggingLevel::Warning, log_id.as_ptr(), &mut env))
                .map_err(OnnxError::ApiInitFailed)?;
            let env = Owned::new(self, env, api.release_env());

            let mut options: *mut OrtSessionOptions = std::ptr::null_mut();
            self.check((api.create_session_options())(&mut options))
                .map_err(OnnxError::SessionCreateFailed)?;
            let options = Owned::new(self, options, api.release_session_options());
            let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
            let _ = self.check((api.set_intra_op_num_threads())(options.ptr, threads as i32));
            let _ = self.check((api.set_session_graph_optimization_level())(options.ptr, GRAPH_OPT_ALL));

            let model_arg = ModelPathArg::new(model_path)?;
            let mut session: *mut OrtSession = std::ptr::null_mut();
            self.check((api.create_session())(env.ptr, model_arg.as_ptr(), options.ptr, &mut session))
                .map_err(OnnxError::ModelLoadFailed)?;
            let session = Owned::new(self, session, api.release_session());

            let mut allocator: *mut OrtAllocator = std::ptr::null_mut();
            self.check((api.get_allocator_with_default_options())(&mut allocator))
                .map_err(|e| OnnxError::SessionCreateFailed(format!("Get allocator: {}", e)))?;

            let size = self.input_size(&session).unwrap_or(DEFAULT_MODEL_SIZE);
            let input_name = self.io_name(&session, allocator, false)?;
            let output_name = self.io_name(&session, allocator, true)?;
            crate::log_info!(
                "Segmentation model: input '{}' {}x{}, output '{}'",
                input_name.to_string_lossy(),
                size,
                size,
                output_name.to_string_lossy()
            );

            // Declared before input_value so it is dropped after it.
            let mut tensor_data = preprocess(input, size);
            let shape: [i64; 4] = [1, 3, size as i64, size as i64];

            let mut memory_info: *mut OrtMemoryInfo = std::ptr::null_mut();
            self.check((api.create_cpu_memory_info())(
                OrtAllocatorType::ArenaAllocator,
                OrtMemType::Default,
                &mut memory_info,
            ))
            .map_err(|e| OnnxError::InferenceFailed(format!("Create memory info: {}", e)))?;
            let memory_info = Owned::new(self, memory_info, api.release_memory_info());

            let mut input_value: *mut OrtValue = std::ptr::null_mut();
            self.check((api.create_tensor_with_data())(
                memory_info.ptr,
                tensor_data.as_mut_ptr() as *mut c_void,
                tensor_data.len() * std::mem::size_of::<f32>(),
                shape.as_ptr(),
                shape.len(),
                ONNXTensorElementDataType::Float,
                &mut input_value,
            ))
            .map_err(|e| OnnxError::InferenceFailed(format!("Create input tensor: {}", e)))?;
            let input_value = Owned::new(self, input_value, api.release_value());

            let input_names = [input_name.as_ptr()];
            let inputs = [input_value.ptr as *const OrtValue];
            let output_names = [output_name.as_ptr()];
            let mut outputs: [*mut OrtValue; 1] = [std::ptr::null_mut()];
            self.check((api.run())(
                session.ptr,
                std::ptr::null(),
                input_names.as_ptr(),
                inputs.as_ptr(),
                1,
                output_names.as_ptr(),
                1,
                outputs.as_mut_ptr(),
            ))
            .map_err(OnnxError::InferenceFailed)?;
            let output = Owned::new(self, outputs[0], api.release_value());
            if output.ptr.is_null() {
                return Err(OnnxError::InvalidOutput("model produced no output".to_string()));
            }

            let mut shape_info: *mut OrtTensorTypeAndShapeInfo = std::ptr::null_mut();
            self.check((api.get_tensor_type_and_shape())(output.ptr, &mut shape_info))
                .map_err(OnnxError::InvalidOutput)?;
            let shape_info = Owned::new(self, shape_info, api.release_tensor_type_and_shape_info());
            let dims = self.dimensions(shape_info.ptr).map_err(OnnxError::InvalidOutput)?;
            let (out_h, out_w) = spatial_dims(&dims)
                .ok_or_else(|| OnnxError::InvalidOutput(format!("unexpected output shape {:?}", dims)))?;

            let mut data_ptr: *mut c_void = std::ptr::null_mut();
            self.check((api.get_tensor_mutable_data())(output.ptr, &mut data_ptr))
                .map_err(|e| OnnxError::InvalidOutput(format!("Get tensor data: {}", e)))?;
            if data_ptr.is_null() {
                return Err(OnnxError::InvalidOutput("null tensor data".to_string()));
            }
            let len = out_w as usize * out_h as usize;
            let data = std::slice::from_raw_parts(data_ptr as *const f32, len).to_vec();

            Ok(RawMask {
                data,
                width: out_w,
                height: out_h,
            })
        }
    }
}

/// Model path in the platform's ORTCHAR_T encoding.
enum ModelPathArg {
    #[allow(dead_code)]
    Wide(Vec<u16>),
    #[allow(dead_code)]
    Narrow(CString),
}

impl ModelPathArg {
    fn new(path: &str) -> Result<Self, OnnxError> {
        if cfg!(windows) {
            Ok(ModelPathArg::Wide(path.encode_utf16().chain(std::iter::once(0)).collect()))
        } else {
            CString::new(path)
                .map(ModelPathArg::Narrow)
                .map_err(|e| OnnxError::ModelLoadFailed(e.to_string()))
        }
    }

    fn as_ptr(&self) -> *const c_void {
        match self {
            ModelPathArg::Wide(w) => w.as_ptr() as *const c_void,
            ModelPathArg::Narrow(c) => c.as_ptr() as *const c_void,
        }
    }
}

/// `(height, width)` from an NCHW / CHW / HW shape. Dynamic (≤ 0) dims give `None`.
fn spatial_dims(dims: &[i64]) -> Option<(u32, u32)> {
    if dims.len() < 2 {
        return None;
    }
    let h = dims[dims.len() - 2];
    let w = dims[dims.len() - 1];
    if h > 0 && w > 0 {
        Some((h as u32, w as u32))
    } else {
        None
    }
}

// ============================================================================
// PRE / POST PROCESSING
// ============================================================================

/// ImageNet normalization constants
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize to `size`×`size`, normalize with ImageNet mean/std, lay out as CHW.
fn preprocess(input: &RgbImage, size: u32) -> Vec<f32> {
    let resized = imageops::resize(input, size, size, imageops::FilterType::Lanczos3);
    let plane = (size * size) as usize;
    let mut tensor = vec![0.0f32; 3 * plane];
    for (idx, p) in resized.pixels().enumerate() {
        for c in 0..3 {
            tensor[c * plane + idx] = (p[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor
}

/// Min–max normalize a saliency map to 0..=255. A flat map keeps everything.
fn normalize_mask(raw: &[f32]) -> Vec<u8> {
    let (min, max) = raw
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !(range.is_finite() && range > 1e-6) {
        return vec![255; raw.len()];
    }
    raw.iter()
        .map(|&v| {
            let v = if v.is_finite() { v } else { min };
            (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Resize the mask to the photo and use it as the alpha channel.
fn apply_mask(original: &RgbImage, mask: GrayImage) -> RgbaImage {
    let (w, h) = original.dimensions();
    let mask = if mask.dimensions() != (w, h) {
        imageops::resize(&mask, w, h, imageops::FilterType::Lanczos3)
    } else {
        mask
    };
    RgbaImage::from_fn(w, h, |x, y| {
        let p = original.get_pixel(x, y);
        image::Rgba([p[0], p[1], p[2], mask.get_pixel(x, y)[0]])
    })
}

// ============================================================================
// SEGMENTER
// ============================================================================

/// Salient-object segmentation through an ONNX model.
pub struct OnnxSegmenter {
    runtime_path: String,
    model_path: String,
}

impl OnnxSegmenter {
    pub fn new(runtime_path: String, model_path: String) -> Self {
        Self {
            runtime_path,
            model_path,
        }
    }
}

impl Segmenter for OnnxSegmenter {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn cut_out(&self, image: &RgbImage) -> Result<RgbaImage, EditError> {
        validate_onnx_path(&self.model_path, false)?;
        if !Path::new(&self.model_path).exists() {
            return Err(OnnxError::ModelNotFound(self.model_path.clone()).into());
        }
        let runtime = OrtRuntime::load(&self.runtime_path)?;
        let raw = runtime.run_mask(&self.model_path, image)?;
        let mask = GrayImage::from_raw(raw.width, raw.height, normalize_mask(&raw.data))
            .ok_or_else(|| OnnxError::InvalidOutput("mask size mismatch".to_string()))?;
        Ok(apply_mask(image, mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_paths() {
        assert!(validate_onnx_path("", true).is_err());
        assert!(validate_onnx_path("relative/libonnxruntime.so", true).is_err());
        assert!(validate_onnx_path("/opt/../etc/libonnxruntime.so", true).is_err());
        assert!(validate_onnx_path("/opt/ort/onnxruntime.txt", true).is_err());
        assert!(validate_onnx_path("/opt/models/u2net.bin", false).is_err());
        assert!(validate_onnx_path("/opt/ort/libonnxruntime.so", true).is_ok());
        assert!(validate_onnx_path("/opt/models/u2net.onnx", false).is_ok());
    }

    #[test]
    fn missing_model_fails_without_loading_runtime() {
        let seg = OnnxSegmenter::new(
            "/nonexistent/libonnxruntime.so".into(),
            "/nonexistent/u2net.onnx".into(),
        );
        let img = RgbImage::new(2, 2);
        match seg.cut_out(&img) {
            Err(EditError::Segmentation(msg)) => assert!(msg.contains("not found")),
            other => panic!("expected segmentation error, got ok={}", other.is_ok()),
        }
    }

    #[test]
    fn mask_is_min_max_normalized() {
        assert_eq!(normalize_mask(&[0.0, 0.5, 1.0]), vec![0, 128, 255]);
        assert_eq!(normalize_mask(&[-3.0, 5.0]), vec![0, 255]);
        assert_eq!(normalize_mask(&[0.4, 0.4]), vec![255, 255]);
        assert_eq!(normalize_mask(&[0.0, f32::NAN, 1.0]), vec![0, 0, 255]);
    }

    #[test]
    fn preprocess_is_chw_normalized() {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 128]));
        let t = preprocess(&img, 4);
        assert_eq!(t.len(), 3 * 16);
        let r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((t[0] - r).abs() < 0.05);
        assert!((t[16] - g).abs() < 0.05);
    }

    #[test]
    fn mask_becomes_alpha_at_photo_size() {
        let img = RgbImage::from_pixel(4, 2, image::Rgb([9, 8, 7]));
        let mask = GrayImage::from_pixel(4, 2, image::Luma([77]));
        let out = apply_mask(&img, mask);
        assert_eq!(out.get_pixel(3, 1), &image::Rgba([9, 8, 7, 77]));

        let small = GrayImage::from_pixel(2, 2, image::Luma([255]));
        let out = apply_mask(&img, small);
        assert_eq!(out.dimensions(), (4, 2));
        assert!(out.get_pixel(0, 0)[3] >= 250);
    }

    #[test]
    fn spatial_dims_take_trailing_pair() {
        assert_eq!(spatial_dims(&[1, 1, 320, 320]), Some((320, 320)));
        assert_eq!(spatial_dims(&[1, 3, -1, -1]), None);
        assert_eq!(spatial_dims(&[5]), None);
    }
}
