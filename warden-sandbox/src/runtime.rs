//! Interpreter-per-call over wasmtime.
//!
//! [`PluginRuntime`] owns a fresh `Engine`; [`PluginRuntime::load`] compiles
//! and vets a bundle into a [`PluginHandle`] with its own `Store` and
//! `Linker`; [`PluginHandle::invoke`] instantiates and runs the resolved
//! handler once. Dropping the handle releases everything. Nothing here is
//! shared between calls.

use crate::config::SandboxConfig;
use crate::context::CapabilityContext;
use crate::error::{SandboxError, SandboxResult};
use crate::exports::{ExportedFunc, detect_action_table};
use crate::host::{self, HostState, HttpBridge};
use crate::limiter::TrackingLimiter;
use tracing::debug;
use wasmtime::{Engine, ExternType, FuncType, Linker, Module, Store, Trap, ValType};

/// Export holding the guest's linear memory.
const MEMORY_EXPORT: &str = "memory";
/// Export the host calls to obtain guest buffers.
const ALLOC_EXPORT: &str = "alloc";

pub(crate) struct PluginRuntime {
    engine: Engine,
}

impl PluginRuntime {
    pub fn new() -> SandboxResult<Self> {
        let mut config = wasmtime::Config::new();
        config.consume_fuel(true);
        config.epoch_interruption(true);
        let engine = Engine::new(&config)
            .map_err(|e| SandboxError::Initialization(format!("wasmtime engine init: {e}")))?;
        Ok(Self { engine })
    }

    /// Handle used by the deadline watchdog to interrupt the guest.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn load(
        &self,
        bundle: &[u8],
        ctx: &CapabilityContext,
        config: &SandboxConfig,
        http: Option<HttpBridge>,
    ) -> SandboxResult<PluginHandle> {
        let module =
            Module::new(&self.engine, bundle).map_err(|e| SandboxError::Compilation(e.to_string()))?;

        vet_imports(&module, ctx)?;
        let exports = check_abi(&module)?;
        let table = detect_action_table(&exports).ok_or(SandboxError::NoActionTable)?;
        let handler = table
            .resolve(ctx.action())
            .ok_or_else(|| SandboxError::ActionNotFound(ctx.action().to_string()))?
            .to_string();
        debug!(shape = ?table.shape(), handler = %handler, "action handler resolved");

        let mut linker = Linker::new(&self.engine);
        for capability in ctx.capabilities().iter() {
            host::link(&mut linker, capability)?;
        }

        let state = HostState {
            limiter: TrackingLimiter::new(config.max_memory_bytes),
            tenant_id: ctx.tenant_id().to_string(),
            plugin_id: ctx.plugin_id().to_string(),
            http,
            max_read_bytes: config.max_output_bytes,
        };
        let mut store = Store::new(&self.engine, state);
        store.limiter(|state| &mut state.limiter);
        store
            .set_fuel(config.fuel_per_call)
            .map_err(|e| SandboxError::Initialization(format!("set fuel: {e}")))?;
        // One tick: the watchdog bumps the epoch once the deadline passes.
        store.set_epoch_deadline(1);

        Ok(PluginHandle {
            store,
            module,
            linker,
            handler,
            fuel_budget: config.fuel_per_call,
            max_output_bytes: config.max_output_bytes,
        })
    }
}

/// Every import must be a function from a granted capability module.
fn vet_imports(module: &Module, ctx: &CapabilityContext) -> SandboxResult<()> {
    for import in module.imports() {
        if !matches!(import.ty(), ExternType::Func(_)) {
            return Err(SandboxError::ForbiddenImport {
                module: import.module().to_string(),
                name: import.name().to_string(),
            });
        }
        ctx.require(import.module(), import.name())?;
    }
    Ok(())
}

/// Checks the guest ABI exports and lists the function exports.
fn check_abi(module: &Module) -> SandboxResult<Vec<ExportedFunc>> {
    let mut has_memory = false;
    let mut has_alloc = false;
    let mut funcs = Vec::new();
    for export in module.exports() {
        match export.ty() {
            ExternType::Memory(_) if export.name() == MEMORY_EXPORT => has_memory = true,
            ExternType::Func(ty) => {
                if export.name() == ALLOC_EXPORT {
                    has_alloc = is_alloc(&ty);
                }
                funcs.push(ExportedFunc::new(export.name(), is_handler(&ty)));
            }
            _ => {}
        }
    }
    if !has_memory {
        return Err(SandboxError::InvalidModule(
            "module does not export 'memory'".into(),
        ));
    }
    if !has_alloc {
        return Err(SandboxError::InvalidModule(
            "module does not export 'alloc(i32) -> i32'".into(),
        ));
    }
    Ok(funcs)
}

fn is_handler(ty: &FuncType) -> bool {
    let params: Vec<ValType> = ty.params().collect();
    let results: Vec<ValType> = ty.results().collect();
    matches!(params.as_slice(), [ValType::I32, ValType::I32])
        && matches!(results.as_slice(), [ValType::I64])
}

fn is_alloc(ty: &FuncType) -> bool {
    let params: Vec<ValType> = ty.params().collect();
    let results: Vec<ValType> = ty.results().collect();
    matches!(params.as_slice(), [ValType::I32]) && matches!(results.as_slice(), [ValType::I32])
}

/// How one handler invocation ended, before the envelope is interpreted.
#[derive(Debug)]
pub(crate) enum Invocation {
    /// The handler returned; these are the bytes it pointed at.
    Returned(Vec<u8>),
    /// The epoch deadline fired.
    Interrupted,
    /// Trap, fuel exhaustion or host failure. Detail is for server logs only.
    Trapped(String),
}

pub(crate) struct PluginHandle {
    store: Store<HostState>,
    module: Module,
    linker: Linker<HostState>,
    handler: String,
    fuel_budget: u64,
    max_output_bytes: usize,
}

impl PluginHandle {
    pub fn invoke(&mut self, input: &[u8]) -> Invocation {
        match self.try_invoke(input) {
            Ok(output) => Invocation::Returned(output),
            Err(e) => match e.downcast_ref::<Trap>() {
                Some(Trap::Interrupt) => Invocation::Interrupted,
                Some(Trap::OutOfFuel) => Invocation::Trapped(format!(
                    "fuel exhausted (budget: {} instructions)",
                    self.fuel_budget
                )),
                _ => Invocation::Trapped(format!("{e:?}")),
            },
        }
    }

    fn try_invoke(&mut self, input: &[u8]) -> wasmtime::Result<Vec<u8>> {
        let instance = self.linker.instantiate(&mut self.store, &self.module)?;
        let memory = instance
            .get_memory(&mut self.store, MEMORY_EXPORT)
            .ok_or_else(|| wasmtime::Error::msg("guest memory export vanished"))?;
        let alloc = instance.get_typed_func::<i32, i32>(&mut self.store, ALLOC_EXPORT)?;
        let handler = instance.get_typed_func::<(i32, i32), i64>(&mut self.store, &self.handler)?;

        let len = i32::try_from(input.len())
            .map_err(|_| wasmtime::Error::msg("input document too large"))?;
        let ptr = alloc.call(&mut self.store, len)?;
        let offset = usize::try_from(ptr)
            .map_err(|_| wasmtime::Error::msg("guest alloc returned a negative pointer"))?;
        memory
            .write(&mut self.store, offset, input)
            .map_err(|e| wasmtime::Error::msg(e.to_string()))?;

        let (out_ptr, out_len) = host::unpack(handler.call(&mut self.store, (ptr, len))?);
        let out_len = out_len as usize;
        if out_len > self.max_output_bytes {
            return Err(wasmtime::Error::msg(format!(
                "handler output of {out_len} bytes exceeds limit of {}",
                self.max_output_bytes
            )));
        }
        let mut output = vec![0u8; out_len];
        memory
            .read(&self.store, out_ptr as usize, &mut output)
            .map_err(|e| wasmtime::Error::msg(e.to_string()))?;
        Ok(output)
    }

    pub fn fuel_consumed(&self) -> u64 {
        self.fuel_budget
            .saturating_sub(self.store.get_fuel().unwrap_or(0))
    }

    pub fn peak_memory_bytes(&self) -> usize {
        self.store.data().limiter.peak_memory_bytes()
    }

    pub fn memory_limit_hit(&self) -> bool {
        self.store.data().limiter.limit_hit()
    }
}
