// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CLI-level compiler config overrides, read from an optional `--config`
//! JSON file and layered over a patch's own `settings` before compiling.

use loomcast_core::graph::PatchSettings;
use serde::Deserialize;

/// Every field is optional; an absent field leaves the patch's own setting
/// untouched. This is a CLI convenience only — the compiler's real config
/// surface is `PatchSettings` on the patch itself (spec.md §6).
#[derive(Debug, Default, Deserialize)]
pub struct CompilerConfig {
    seed: Option<u32>,
    adapter_cost_budget: Option<u32>,
    param_chain_max_depth: Option<u32>,
    trace_enabled: Option<bool>,
}

impl CompilerConfig {
    /// Overwrites each field of `settings` that this config specifies.
    pub fn apply(&self, settings: &mut PatchSettings) {
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        if let Some(budget) = self.adapter_cost_budget {
            settings.adapter_cost_budget = budget;
        }
        if let Some(depth) = self.param_chain_max_depth {
            settings.param_chain_max_depth = depth;
        }
        if let Some(trace) = self.trace_enabled {
            settings.trace_enabled = trace;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_leave_settings_untouched() {
        let mut settings = PatchSettings::default();
        let config = CompilerConfig::default();
        config.apply(&mut settings);
        assert_eq!(settings, PatchSettings::default());
    }

    #[test]
    fn present_fields_override_settings() {
        let mut settings = PatchSettings::default();
        let config: CompilerConfig = serde_json::from_str(r#"{"seed": 7, "trace_enabled": true}"#).unwrap();
        config.apply(&mut settings);
        assert_eq!(settings.seed, 7);
        assert!(settings.trace_enabled);
        assert_eq!(settings.adapter_cost_budget, 4);
    }
}
