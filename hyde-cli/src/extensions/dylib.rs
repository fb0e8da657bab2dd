//! Shared-object extensions loaded with `libloading`.
//!
//! Instances are opaque pointers owned by the module. Every instance is
//! destroyed with the module's own destroy function, and every log string
//! it hands out is released with its paired free function. Step calls can
//! run for minutes, so they go to the blocking pool.

use std::ffi::{CStr, CString, c_char, c_void};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libloading::Library;

use hyde_core::error::LoadError;
use hyde_core::extension::{AurHelper, ExtensionProvider, Installer, Module, Patcher};

type CreateFn = unsafe extern "C" fn() -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type StepFn = unsafe extern "C" fn(*mut c_void) -> bool;
type StepWithArgFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> bool;
type GetLogsFn = unsafe extern "C" fn(*mut c_void) -> *mut c_char;
type FreeLogsFn = unsafe extern "C" fn(*mut c_char);

/// Loads modules from shared objects on disk.
pub struct DylibProvider;

impl ExtensionProvider for DylibProvider {
    fn name(&self) -> &'static str {
        "dylib"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Module>, LoadError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        // SAFETY: module initialisers run here; the module directory is trusted
        let library = unsafe { Library::new(path) }.map_err(|e| {
            tracing::warn!(module = %name, error = %e, "failed to open shared object");
            LoadError::NotFound {
                module: name.clone(),
            }
        })?;

        Ok(Box::new(DylibModule {
            name,
            library: Arc::new(library),
        }))
    }
}

struct DylibModule {
    name: String,
    library: Arc<Library>,
}

fn symbol<T: Copy>(library: &Library, name: &str) -> Option<T> {
    // SAFETY: callers pick `T` to match the exported C signature
    unsafe { library.get::<T>(name.as_bytes()) }
        .ok()
        .map(|s| *s)
}

impl Module for DylibModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_entry_point(&self, name: &str) -> bool {
        symbol::<*const c_void>(&self.library, name).is_some()
    }

    fn create_patcher(&self) -> Option<Box<dyn Patcher>> {
        let api = PatcherApi::resolve(&self.library)?;
        let instance = Instance::create(api.create, api.destroy, &self.library)?;
        Some(Box::new(DylibPatcher { api, instance }))
    }

    fn create_installer(&self) -> Option<Box<dyn Installer>> {
        let api = InstallerApi::resolve(&self.library)?;
        let instance = Instance::create(api.create, api.destroy, &self.library)?;
        Some(Box::new(DylibInstaller { api, instance }))
    }
}

/// A live module instance. Destroyed when the last reference goes, which
/// may be a blocking call still running after its caller was cancelled.
struct Instance {
    ptr: *mut c_void,
    destroy: DestroyFn,
    _library: Arc<Library>,
}

// SAFETY: the owning wrapper awaits each call before making the next, so
// the module never sees two calls on one instance at once
unsafe impl Send for Instance {}
unsafe impl Sync for Instance {}

impl Instance {
    fn create(create: CreateFn, destroy: DestroyFn, library: &Arc<Library>) -> Option<Arc<Self>> {
        // SAFETY: resolved from `library`, which the instance keeps loaded
        let ptr = unsafe { create() };
        if ptr.is_null() {
            return None;
        }
        Some(Arc::new(Self {
            ptr,
            destroy,
            _library: Arc::clone(library),
        }))
    }

    fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: destroyed once, before the library handle is released
        unsafe { (self.destroy)(self.ptr) }
    }
}

/// Run one module call on the blocking pool.
async fn blocking_call<F>(instance: &Arc<Instance>, call: F) -> bool
where
    F: FnOnce(*mut c_void) -> bool + Send + 'static,
{
    let instance = Arc::clone(instance);
    tokio::task::spawn_blocking(move || call(instance.as_ptr()))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "module call did not complete");
            false
        })
}

async fn step(instance: &Arc<Instance>, f: StepFn) -> bool {
    // SAFETY: the instance is kept alive by the clone inside the call
    blocking_call(instance, move |ptr| unsafe { f(ptr) }).await
}

async fn step_with(instance: &Arc<Instance>, f: StepWithArgFn, arg: &str) -> bool {
    let Ok(arg) = CString::new(arg) else {
        return false;
    };
    // SAFETY: live instance, NUL-terminated argument
    blocking_call(instance, move |ptr| unsafe { f(ptr, arg.as_ptr()) }).await
}

/// A log string owned by the module, freed on drop.
struct ForeignLogs {
    ptr: *mut c_char,
    free: FreeLogsFn,
}

impl ForeignLogs {
    fn read(instance: &Instance, get: GetLogsFn, free: FreeLogsFn) -> String {
        // SAFETY: `instance` is live for the duration of the call
        let logs = Self {
            ptr: unsafe { get(instance.as_ptr()) },
            free,
        };
        if logs.ptr.is_null() {
            return String::new();
        }
        // SAFETY: the module returns a NUL-terminated string
        unsafe { CStr::from_ptr(logs.ptr) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for ForeignLogs {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: released exactly once with the paired function
            unsafe { (self.free)(self.ptr) }
        }
    }
}

#[derive(Clone, Copy)]
struct PatcherApi {
    create: CreateFn,
    destroy: DestroyFn,
    initialize: StepWithArgFn,
    get_logs: GetLogsFn,
    free_logs: FreeLogsFn,
    update_mirrorlist: StepFn,
    check_aur: StepFn,
    install_aur_helper: StepWithArgFn,
}

impl PatcherApi {
    fn resolve(library: &Library) -> Option<Self> {
        Some(Self {
            create: symbol(library, "create_patcher")?,
            destroy: symbol(library, "destroy_patcher")?,
            initialize: symbol(library, "initialize_patcher")?,
            get_logs: symbol(library, "get_patcher_logs")?,
            free_logs: symbol(library, "free_patcher_logs")?,
            update_mirrorlist: symbol(library, "update_system_mirrorlist")?,
            check_aur: symbol(library, "check_aur_availability")?,
            install_aur_helper: symbol(library, "install_aur_helper")?,
        })
    }
}

struct DylibPatcher {
    api: PatcherApi,
    instance: Arc<Instance>,
}

#[async_trait]
impl Patcher for DylibPatcher {
    async fn initialize(&mut self, credential: &str) -> bool {
        step_with(&self.instance, self.api.initialize, credential).await
    }

    async fn update_mirrorlist(&mut self) -> bool {
        step(&self.instance, self.api.update_mirrorlist).await
    }

    async fn check_aur_available(&mut self) -> bool {
        step(&self.instance, self.api.check_aur).await
    }

    async fn install_aur_helper(&mut self, helper: AurHelper) -> bool {
        step_with(&self.instance, self.api.install_aur_helper, helper.as_str()).await
    }

    fn logs(&self) -> String {
        ForeignLogs::read(&self.instance, self.api.get_logs, self.api.free_logs)
    }
}

#[derive(Clone, Copy)]
struct InstallerApi {
    create: CreateFn,
    destroy: DestroyFn,
    run: StepFn,
    get_logs: GetLogsFn,
    free_logs: FreeLogsFn,
}

impl InstallerApi {
    fn resolve(library: &Library) -> Option<Self> {
        Some(Self {
            create: symbol(library, "create_installer")?,
            destroy: symbol(library, "destroy_installer")?,
            run: symbol(library, "run_installation")?,
            get_logs: symbol(library, "get_installer_logs")?,
            free_logs: symbol(library, "free_installer_logs")?,
        })
    }
}

struct DylibInstaller {
    api: InstallerApi,
    instance: Arc<Instance>,
}

#[async_trait]
impl Installer for DylibInstaller {
    async fn run_installation(&mut self) -> bool {
        step(&self.instance, self.api.run).await
    }

    fn logs(&self) -> String {
        ForeignLogs::read(&self.instance, self.api.get_logs, self.api.free_logs)
    }
}
