//! Reporter invocation: who to launch, with which arguments.

use std::ffi::{CStr, CString};
use std::io::Write;
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use viewer_config::{log_crash_info, log_crash_warn, CrashConfig};

use crate::spawn::{DetachedChild, DetachedSpawner, ForkExecSpawner};
use crate::CrashError;

/// Identifying context handed to the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterContext {
    pub reporter_path: PathBuf,
    pub grid_id: String,
    pub app_title: String,
    pub pid: u32,
    pub dump_dir: PathBuf,
    pub exe_name: String,
}

impl ReporterContext {
    /// Resolve the context for the current process.
    ///
    /// The reporter lives next to the running executable.
    pub fn from_config(config: &CrashConfig) -> Result<Self, CrashError> {
        let exe_dir = viewer_config::path::executable_dir()
            .map_err(|e| CrashError::Context(format!("{:#}", e)))?;
        let exe_name = viewer_config::path::executable_name()
            .map_err(|e| CrashError::Context(format!("{:#}", e)))?;
        let dump_dir = viewer_config::path::dump_dir(config);

        Ok(Self {
            reporter_path: exe_dir.join(&config.reporter_name),
            grid_id: config.grid_id.clone(),
            app_title: config.app_title.clone(),
            pid: std::process::id(),
            dump_dir,
            exe_name,
        })
    }

    /// Reporter arguments, without argv[0].
    pub fn args(&self, report_freeze: bool) -> Vec<String> {
        let mut args = vec![
            "-user".to_string(),
            self.grid_id.clone(),
            "-name".to_string(),
            self.app_title.clone(),
            "-pid".to_string(),
            self.pid.to_string(),
            "-dumpdir".to_string(),
            self.dump_dir.display().to_string(),
            "-procname".to_string(),
            self.exe_name.clone(),
        ];
        if report_freeze {
            args.push("-freeze".to_string());
        }
        args
    }

    /// Full argument vector, argv[0] included.
    pub fn argv(&self, report_freeze: bool) -> Vec<String> {
        let mut argv = vec![self.reporter_path.display().to_string()];
        argv.extend(self.args(report_freeze));
        argv
    }

    pub fn prepare(&self, report_freeze: bool) -> Result<PreparedLaunch, CrashError> {
        PreparedLaunch::new(&self.reporter_path, &self.args(report_freeze))
    }
}

/// A reporter launch with every C string and pointer built ahead of time,
/// usable from a signal handler.
pub struct PreparedLaunch {
    path: CString,
    argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    exec_failure: Vec<u8>,
}

// argv_ptrs point into the heap buffers owned by `argv`, which are never
// mutated after construction.
unsafe impl Send for PreparedLaunch {}
unsafe impl Sync for PreparedLaunch {}

impl PreparedLaunch {
    pub fn new(path: &Path, args: &[String]) -> Result<Self, CrashError> {
        let path_c = CString::new(path.as_os_str().as_bytes())?;

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(path_c.clone());
        for arg in args {
            argv.push(CString::new(arg.as_bytes())?);
        }

        let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        let exec_failure = format!(
            "[viewer-crash] execv failure when trying to start {}\n",
            path.display()
        )
        .into_bytes();

        Ok(Self {
            path: path_c,
            argv,
            argv_ptrs,
            exec_failure,
        })
    }

    pub fn path(&self) -> &CStr {
        &self.path
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    pub(crate) fn path_ptr(&self) -> *const c_char {
        self.path.as_ptr()
    }

    pub(crate) fn argv_ptr(&self) -> *const *const c_char {
        self.argv_ptrs.as_ptr()
    }

    pub(crate) fn exec_failure_message(&self) -> &[u8] {
        &self.exec_failure
    }
}

impl std::fmt::Debug for PreparedLaunch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedLaunch")
            .field("path", &self.path)
            .field("argv", &self.argv)
            .finish()
    }
}

/// Flush Rust and C standard streams so nothing buffered is lost when the
/// process dies right after.
pub fn flush_output_streams() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    unsafe {
        libc::fflush(std::ptr::null_mut());
    }
}

/// Launches the reporter on request, e.g. for freeze reports.
pub struct CrashReporter {
    context: ReporterContext,
    spawner: Box<dyn DetachedSpawner>,
}

impl CrashReporter {
    pub fn new(context: ReporterContext, spawner: Box<dyn DetachedSpawner>) -> Self {
        Self { context, spawner }
    }

    pub fn with_fork_exec(context: ReporterContext) -> Self {
        Self::new(context, Box::new(ForkExecSpawner))
    }

    pub fn context(&self) -> &ReporterContext {
        &self.context
    }

    /// Launch the reporter detached and return immediately.
    ///
    /// A spawn failure is logged and returned; the caller carries on.
    pub fn launch_reporter(&self, report_freeze: bool) -> Result<DetachedChild, CrashError> {
        let launch = self.context.prepare(report_freeze)?;
        flush_output_streams();

        match self.spawner.spawn_detached(&launch) {
            Ok(child) => {
                log_crash_info!(
                    "Launched crash reporter",
                    pid = child.pid,
                    freeze = report_freeze
                );
                Ok(child)
            }
            Err(e) => {
                log_crash_warn!(
                    "fork failure launching crash reporter",
                    error = tracing::field::display(&e)
                );
                Err(e.into())
            }
        }
    }
}
