use crate::{
    codegen::{CodeGenerator, NullCodeGenerator},
    module::{CompiledModule, ModuleError},
    validate,
    Config,
};
use core::fmt::{self, Debug};
use cove_ir::Module;
use std::sync::Arc;

struct EngineInner {
    config: Config,
    codegen: Arc<dyn CodeGenerator>,
}

/// The compilation pipeline: a [`Config`] plus an opaque code generator.
///
/// Engines are cheap to clone and share; every [`CompiledModule`] keeps
/// its engine alive.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Default for Engine {
    /// An engine over the [`NullCodeGenerator`].
    ///
    /// Useful for embeddings that only decode, validate, link and host
    /// syscalls; the produced entry points must never be invoked.
    fn default() -> Self {
        Self::new(Config::default(), Arc::new(NullCodeGenerator))
    }
}

impl Engine {
    /// Creates an [`Engine`] with the given configuration and code
    /// generator.
    pub fn new(config: Config, codegen: Arc<dyn CodeGenerator>) -> Self {
        Self {
            inner: Arc::new(EngineInner { config, codegen }),
        }
    }

    /// Returns the configuration of the engine.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the code generator of the engine.
    pub(crate) fn codegen(&self) -> &Arc<dyn CodeGenerator> {
        &self.inner.codegen
    }

    /// Validates and compiles a decoded module.
    ///
    /// Modules that fail validation are never handed to the code
    /// generator.
    ///
    /// # Errors
    ///
    /// On validation or code-generation failure.
    pub fn compile(&self, module: Module) -> Result<CompiledModule, ModuleError> {
        validate::validate(&module, &self.inner.config).map_err(ModuleError::Validation)?;
        let object = self
            .inner
            .codegen
            .compile(&module, &self.inner.config)
            .map_err(ModuleError::Codegen)?;
        Ok(CompiledModule::new(self.clone(), Arc::new(module), object))
    }

    /// Decodes, validates and compiles binary module bytes, using the
    /// embedded precompiled object instead of the code generator when
    /// one with a matching version tag is present.
    ///
    /// # Errors
    ///
    /// On decode, validation or code-generation failure, or when a
    /// precompiled object carries a mismatching version tag.
    pub fn load(&self, bytes: &[u8]) -> Result<CompiledModule, ModuleError> {
        let (module, _diagnostics) = cove_ir::decode(bytes).map_err(ModuleError::Decode)?;
        if let Some(object) = CompiledModule::extract_precompiled(&module)? {
            let expected = self.inner.codegen.version_tag();
            if object.version_tag != expected {
                return Err(ModuleError::PrecompiledVersionMismatch {
                    expected,
                    found: object.version_tag,
                });
            }
            validate::validate(&module, &self.inner.config).map_err(ModuleError::Validation)?;
            return Ok(CompiledModule::new(self.clone(), Arc::new(module), object));
        }
        self.compile(module)
    }
}
