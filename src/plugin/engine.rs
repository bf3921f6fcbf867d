//! One QuickJS runtime per plugin script.

use std::path::{Path, PathBuf};

use rquickjs::function::Rest;
use rquickjs::{CatchResultExt, Context, Runtime, Value};
use tracing::debug;

use super::host::HostCapabilities;
use super::value::PluginValue;
use crate::error::{ProviderError, Result};

/// Heap ceiling for a single plugin.
pub const MEMORY_LIMIT: usize = 32 * 1024 * 1024;
/// Native stack ceiling for a single plugin.
pub const STACK_LIMIT: usize = 1024 * 1024;

/// An evaluated plugin script and the context its globals live in.
///
/// Not reentrant: callers serialise access (see
/// [`super::runner::PluginProvider`]).
pub struct PluginEngine {
    path: PathBuf,
    // Field order matters: the context must drop before its runtime.
    context: Context,
    _runtime: Runtime,
}

impl PluginEngine {
    /// Read and evaluate the script at `path`.
    pub fn load(path: &Path, host: &HostCapabilities) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| ProviderError::PluginLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_source(path, &source, host)
    }

    /// Evaluate `source` as if it had been read from `path`.
    pub fn from_source(path: &Path, source: &str, host: &HostCapabilities) -> Result<Self> {
        let load_error = |message: String| ProviderError::PluginLoad {
            path: path.to_path_buf(),
            message,
        };

        let runtime = Runtime::new()?;
        runtime.set_memory_limit(MEMORY_LIMIT);
        runtime.set_max_stack_size(STACK_LIMIT);
        let context = Context::full(&runtime)?;

        context.with(|ctx| -> Result<()> {
            host.install(&ctx)?;
            ctx.eval::<(), _>(source)
                .catch(&ctx)
                .map_err(|e| load_error(e.to_string()))
        })?;

        debug!(path = %path.display(), bytes = source.len(), "Plugin evaluated");
        Ok(Self {
            path: path.to_path_buf(),
            context,
            _runtime: runtime,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the script defines a global function called `name`.
    pub fn has_function(&self, name: &str) -> bool {
        self.context.with(|ctx| {
            ctx.globals()
                .get::<_, Value>(name)
                .is_ok_and(|v| v.is_function())
        })
    }

    /// Call the global function `name` with marshalled `args`.
    pub fn call(&self, name: &str, args: &[PluginValue]) -> Result<PluginValue> {
        self.context.with(|ctx| {
            let value: Value = ctx.globals().get(name)?;
            let Some(function) = value.as_function().cloned() else {
                return Err(ProviderError::FunctionNotFound(name.to_string()));
            };

            let args = args
                .iter()
                .map(|a| a.to_js(&ctx))
                .collect::<rquickjs::Result<Vec<_>>>()?;

            let result: Value = function
                .call((Rest(args),))
                .catch(&ctx)
                .map_err(|e| ProviderError::plugin_call(name, e))?;

            Ok(PluginValue::from_js(&result)?)
        })
    }
}

impl std::fmt::Debug for PluginEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEngine")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
