//! The build session: configuration, collaborators and the resolver memo
//! shared by everything one invocation builds.
//!
//! A session is created once per top-level invocation and passed by
//! reference. Sub-builds reuse the caller's session, so descriptors parsed
//! (or found missing) in one directory are not looked up again in another.

use crate::config::FakeConfig;
use crate::maven::{HttpTransport, Resolver, Transport};
use crate::toolchain::{Compiler, ExternalCompiler, NativeToolchain, ProcessRunner, SystemRunner};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

pub struct Session {
    config: FakeConfig,
    compiler: Arc<dyn Compiler>,
    runner: Arc<dyn ProcessRunner>,
    native: NativeToolchain,
    resolver: Mutex<Resolver>,
    verbose: bool,
}

impl Session {
    pub fn new(config: FakeConfig) -> Self {
        SessionBuilder::new(config).build()
    }

    pub fn builder(config: FakeConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn config(&self) -> &FakeConfig {
        &self.config
    }

    pub fn compiler(&self) -> &dyn Compiler {
        self.compiler.as_ref()
    }

    pub fn runner(&self) -> &dyn ProcessRunner {
        self.runner.as_ref()
    }

    pub fn native(&self) -> &NativeToolchain {
        &self.native
    }

    /// Locks the resolver. Workers building modules hold it for the whole
    /// module build.
    pub fn resolver(&self) -> MutexGuard<'_, Resolver> {
        self.resolver.lock()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Assembles a [`Session`]; anything not supplied gets the real
/// implementation.
pub struct SessionBuilder {
    config: FakeConfig,
    transport: Option<Arc<dyn Transport>>,
    compiler: Option<Arc<dyn Compiler>>,
    runner: Option<Arc<dyn ProcessRunner>>,
    native: Option<NativeToolchain>,
    verbose: bool,
}

impl SessionBuilder {
    pub fn new(config: FakeConfig) -> Self {
        Self {
            config,
            transport: None,
            compiler: None,
            runner: None,
            native: None,
            verbose: false,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn native(mut self, native: NativeToolchain) -> Self {
        self.native = Some(native);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(self) -> Session {
        let runner = self.runner.unwrap_or_else(|| Arc::new(SystemRunner));
        let compiler = self.compiler.unwrap_or_else(|| {
            let build = &self.config.build;
            Arc::new(ExternalCompiler::new(
                &build.compiler,
                &build.source_extension,
                &build.output_extension,
                runner.clone(),
            ))
        });
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::default()));
        let resolver =
            Resolver::new(self.config.resolver.clone(), transport).with_verbose(self.verbose);
        Session {
            native: self.native.unwrap_or_else(NativeToolchain::from_env),
            config: self.config,
            compiler,
            runner,
            resolver: Mutex::new(resolver),
            verbose: self.verbose,
        }
    }
}
