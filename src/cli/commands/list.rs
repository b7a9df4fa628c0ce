//! `quantbench list`: the harvest target catalog.

use anyhow::Result;
use comfy_table::{Cell, CellAlignment};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::types::ListArgs;
use crate::domain::models::{Config, ModelSpec, ProviderKind};
use crate::infrastructure::providers::ProviderRegistry;

#[derive(Debug, Serialize)]
pub struct TargetOutput {
    pub id: String,
    pub provider: String,
    pub slug: String,
    pub display_name: String,
    pub reasoning: bool,
    pub delay_ms: u64,
    pub configured: bool,
}

#[derive(Debug, Serialize)]
pub struct TargetListOutput {
    pub targets: Vec<TargetOutput>,
    pub total: usize,
}

impl CommandOutput for TargetListOutput {
    fn to_human(&self) -> String {
        if self.targets.is_empty() {
            return "No targets found.".to_string();
        }

        let formatter = TableFormatter::new();
        let mut table = formatter.base_table(&[
            "Model", "Provider", "Name", "Reasoning", "Delay", "Configured",
        ]);
        for target in &self.targets {
            table.add_row(vec![
                Cell::new(&target.id),
                Cell::new(&target.provider),
                Cell::new(&target.display_name),
                Cell::new(if target.reasoning { "yes" } else { "" }),
                Cell::new(format!("{:.1}s", target.delay_ms as f64 / 1000.0))
                    .set_alignment(CellAlignment::Right),
                formatter.status_cell(target.configured),
            ]);
        }

        format!("{} target(s):\n{table}", self.total)
    }
}

pub(crate) fn target_list(config: &Arc<Config>, filter: Option<ProviderKind>) -> TargetListOutput {
    let registry = ProviderRegistry::new(Arc::clone(config));
    let targets: Vec<TargetOutput> = registry
        .catalog()
        .iter()
        .filter(|model| filter.is_none_or(|kind| model.provider == kind))
        .map(|model| describe(model, &registry, config))
        .collect();

    TargetListOutput {
        total: targets.len(),
        targets,
    }
}

fn describe(model: &ModelSpec, registry: &ProviderRegistry, config: &Config) -> TargetOutput {
    TargetOutput {
        id: model.id.clone(),
        provider: model.provider.to_string(),
        slug: model.slug.clone(),
        display_name: model.display_name.clone(),
        reasoning: model.reasoning,
        delay_ms: config.harvest.delay_for(model),
        configured: registry.is_configured(model.provider),
    }
}

pub async fn execute(args: ListArgs, config: Arc<Config>, json_mode: bool) -> Result<ExitCode> {
    output(&target_list(&config, args.provider), json_mode);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_provider() {
        let config = Arc::new(Config::default());
        let list = temp_env::with_var_unset("GEMINI_API_KEY", || {
            target_list(&config, Some(ProviderKind::Gemini))
        });
        assert_eq!(list.total, 3);
        assert!(list.targets.iter().all(|t| t.provider == "gemini" && !t.configured));
    }

    #[test]
    fn test_delay_override_reported() {
        let config = Arc::new(Config::default());
        let list = target_list(&config, None);
        let preview = list
            .targets
            .iter()
            .find(|t| t.id == "gemini-3.1-pro-preview")
            .unwrap();
        assert_eq!(preview.delay_ms, 45_000);
        assert!(TargetListOutput { targets: Vec::new(), total: 0 }
            .to_human()
            .contains("No targets"));
    }
}
