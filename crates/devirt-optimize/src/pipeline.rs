use devirt_core::ast::Module;
use devirt_core::config::LoweringOptions;
use devirt_core::diagnostics::DiagnosticManager;
use devirt_core::error::Result;
use devirt_core::hierarchy::HierarchyModel;
use devirt_core::lir::LirModule;
use tracing::{error, info, info_span};

use crate::passes::validate::validate;
use crate::transformations::AstToLir;

pub const DIAGNOSTIC_CONTEXT: &str = "devirt";

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub hierarchy: HierarchyModel,
    pub module: LirModule,
}

/// Builds the hierarchy, lowers every method and function and validates the
/// result. Errors are reported to the owned diagnostic manager as well as
/// returned.
pub struct DispatchPipeline {
    options: LoweringOptions,
    diagnostics: DiagnosticManager,
}

impl DispatchPipeline {
    pub fn new(options: LoweringOptions) -> Self {
        Self {
            options,
            diagnostics: DiagnosticManager::new(),
        }
    }

    /// Pipeline configured from `DEVIRT_GENERIC_POLICY` and `DEVIRT_NARROWING`.
    pub fn from_env() -> Self {
        Self::new(LoweringOptions::from_env())
    }

    pub fn options(&self) -> LoweringOptions {
        self.options
    }

    pub fn diagnostics(&self) -> &DiagnosticManager {
        &self.diagnostics
    }

    pub fn render_diagnostics(&self, verbose: bool) -> Vec<String> {
        self.diagnostics.render_plain(DIAGNOSTIC_CONTEXT, verbose)
    }

    pub fn run(&mut self, module: &Module) -> Result<PipelineOutput> {
        let span = info_span!("devirt", classes = module.classes.len(), functions = module.functions.len());
        let _enter = span.enter();
        match self.run_stages(module) {
            Ok(output) => {
                info!(
                    "devirtualized {} classes into {} functions, {} tag switches",
                    output.hierarchy.len(),
                    output.module.functions.len(),
                    output.module.tag_switches().len()
                );
                Ok(output)
            }
            Err(err) => {
                error!("dispatch resolution failed: {}", err);
                self.diagnostics.report(&err);
                Err(err)
            }
        }
    }

    fn run_stages(&mut self, module: &Module) -> Result<PipelineOutput> {
        let hierarchy = HierarchyModel::from_decls(&module.classes)?;
        let lowered = AstToLir::new(&hierarchy, module, self.options).lower(&mut self.diagnostics)?;
        validate(&lowered)?;
        Ok(PipelineOutput {
            hierarchy,
            module: lowered,
        })
    }
}

impl Default for DispatchPipeline {
    fn default() -> Self {
        Self::new(LoweringOptions::default())
    }
}
