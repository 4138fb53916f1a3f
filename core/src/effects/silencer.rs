//! Visual suppression for maintained abilities
//!
//! Two paths, tried in order per sub-effect:
//! 1. PersistToggle: clear the setting's persist-visual flag and let the
//!    [`EffectRestorer`] put it back after a short delay.
//! 2. ShaderFallback: zero the four alpha ratios of the attached shader,
//!    keeping the originals for exact restoration.
//!
//! Archetypes whose visuals are gameplay feedback are never touched.

use crate::host::{Host, ShaderAlpha};
use crate::registry::{MaintainedPair, SilenceMode, SilencedEffectRecord};

use super::EffectRestorer;

/// Suppress the persistent visuals of `pair`'s converted ability.
///
/// No-op when the pair is already silenced or the converted ability is gone.
pub fn silence<H: Host + ?Sized>(host: &mut H, restorer: &mut EffectRestorer, pair: &mut MaintainedPair) {
    if pair.has_silenced_fx() {
        return;
    }
    let Some(converted) = host.ability(pair.converted) else {
        return;
    };
    let settings: Vec<_> = converted.effects.iter().map(|e| e.setting).collect();

    for setting_id in settings {
        let Some(setting) = host.effect_setting(setting_id).cloned() else {
            continue;
        };
        if setting.archetype.is_never_silenced() {
            tracing::debug!(effect = %setting.name, "FX will not be silenced");
            continue;
        }

        if setting.fx_persist {
            host.set_fx_persist(setting.id, false);
            restorer.push(setting.id, None);
            pair.silenced_effects.push(SilencedEffectRecord {
                setting: setting.id,
                mode: SilenceMode::PersistToggle,
                had_flag_set: true,
                shader: None,
                alpha_snapshot: None,
            });
            tracing::debug!(effect = %setting.name, "Silenced FX via persist toggle");
            continue;
        }

        if let Some(shader) = setting.shader {
            // A shader shared by two sub-effects is only snapshotted once.
            let already = pair
                .silenced_effects
                .iter()
                .any(|r| r.shader == Some(shader));
            if already {
                continue;
            }
            let snapshot = host.shader_alpha(shader);
            if snapshot.is_some() {
                host.set_shader_alpha(shader, ShaderAlpha::ZERO);
            }
            pair.silenced_effects.push(SilencedEffectRecord {
                setting: setting.id,
                mode: SilenceMode::ShaderFallback,
                had_flag_set: false,
                shader: Some(shader),
                alpha_snapshot: snapshot,
            });
            tracing::debug!(effect = %setting.name, "Silenced FX via shader fallback");
            continue;
        }

        tracing::debug!(effect = %setting.name, "No FX silence path");
    }
}

/// Restore shader-silenced visuals and drop every record of `pair`.
///
/// Persist-toggle records are left to the restorer's own schedule.
pub fn unsilence<H: Host + ?Sized>(host: &mut H, pair: &mut MaintainedPair) {
    for record in pair.silenced_effects.drain(..) {
        if record.mode != SilenceMode::ShaderFallback {
            continue;
        }
        if let (Some(shader), Some(alpha)) = (record.shader, record.alpha_snapshot) {
            host.set_shader_alpha(shader, alpha);
            tracing::debug!(setting = %record.setting, "Restored FX shader visuals");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Archetype, FormId, ShaderId, SubEffect};
    use crate::sim::{spell, SimHost};

    const PERSIST: FormId = FormId(0x1000);
    const SHADED: FormId = FormId(0x1001);
    const LIGHT: FormId = FormId(0x1002);
    const PLAIN: FormId = FormId(0x1003);
    const SHADER: ShaderId = ShaderId(0x7000);
    const CONVERTED: FormId = FormId(0xFF03_F800);

    const ORIGINAL: ShaderAlpha = ShaderAlpha {
        fill_persistent: 0.35,
        fill_full: 1.0,
        edge_persistent: 0.125,
        edge_full: 0.8,
    };

    fn make_host(settings: &[FormId]) -> SimHost {
        let mut host = SimHost::new();
        host.define_setting(PERSIST, "Persistent Glow", Archetype::ValueModifier).fx_persist = true;
        host.define_setting(SHADED, "Shaded Aura", Archetype::ValueModifier).shader = Some(SHADER);
        host.define_setting(LIGHT, "Candlelight", Archetype::Light).fx_persist = true;
        host.define_setting(PLAIN, "Plain", Archetype::ValueModifier);
        host.shaders.insert(SHADER, ORIGINAL);

        let mut converted = spell(CONVERTED, "Maintained Aura", settings[0], 0.0);
        converted.effects = settings
            .iter()
            .map(|s| SubEffect {
                setting: *s,
                magnitude: 1.0,
                duration: 0.0,
            })
            .collect();
        host.abilities.insert(CONVERTED, converted);
        host
    }

    fn make_pair() -> MaintainedPair {
        MaintainedPair::new(FormId(0x2000), CONVERTED, FormId(0xFF03_F801), false)
    }

    #[test]
    fn test_shader_fallback_round_trip_is_exact() {
        let mut host = make_host(&[SHADED]);
        let mut restorer = EffectRestorer::new();
        let mut pair = make_pair();

        silence(&mut host, &mut restorer, &mut pair);
        assert_eq!(host.shaders[&SHADER], ShaderAlpha::ZERO);
        assert_eq!(pair.silenced_effects.len(), 1);
        assert_eq!(pair.silenced_effects[0].mode, SilenceMode::ShaderFallback);

        unsilence(&mut host, &mut pair);
        let restored = host.shaders[&SHADER];
        assert_eq!(restored.fill_persistent.to_bits(), ORIGINAL.fill_persistent.to_bits());
        assert_eq!(restored.fill_full.to_bits(), ORIGINAL.fill_full.to_bits());
        assert_eq!(restored.edge_persistent.to_bits(), ORIGINAL.edge_persistent.to_bits());
        assert_eq!(restored.edge_full.to_bits(), ORIGINAL.edge_full.to_bits());
        assert!(pair.silenced_effects.is_empty());
    }

    #[test]
    fn test_persist_toggle_schedules_restore() {
        let mut host = make_host(&[PERSIST]);
        let mut restorer = EffectRestorer::new();
        let mut pair = make_pair();

        silence(&mut host, &mut restorer, &mut pair);
        assert!(!host.settings[&PERSIST].fx_persist);
        assert!(restorer.is_pending(PERSIST));
        assert_eq!(pair.silenced_effects[0].mode, SilenceMode::PersistToggle);
        assert!(pair.silenced_effects[0].had_flag_set);

        unsilence(&mut host, &mut pair);
        assert!(pair.silenced_effects.is_empty());
        assert!(
            !host.settings[&PERSIST].fx_persist,
            "Persist flag is left to the restorer"
        );
    }

    #[test]
    fn test_never_silenced_and_no_path() {
        let mut host = make_host(&[LIGHT, PLAIN]);
        let mut restorer = EffectRestorer::new();
        let mut pair = make_pair();

        silence(&mut host, &mut restorer, &mut pair);
        assert!(pair.silenced_effects.is_empty());
        assert!(host.settings[&LIGHT].fx_persist);
        assert!(restorer.is_empty());
    }

    #[test]
    fn test_silence_is_noop_when_already_silenced() {
        let mut host = make_host(&[SHADED, PERSIST]);
        let mut restorer = EffectRestorer::new();
        let mut pair = make_pair();

        silence(&mut host, &mut restorer, &mut pair);
        assert_eq!(pair.silenced_effects.len(), 2);

        // Zeroed alpha must not be captured as the "original"
        silence(&mut host, &mut restorer, &mut pair);
        assert_eq!(pair.silenced_effects.len(), 2);
        unsilence(&mut host, &mut pair);
        assert_eq!(host.shaders[&SHADER], ORIGINAL);
    }
}
