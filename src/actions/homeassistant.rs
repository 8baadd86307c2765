//! Built-in Home Assistant light actions

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::{Action, ActionContext};
use crate::params::{ParamValue, Params, PRESETS_KEY};

/// Active preset: cycle value first, then a single `preset` param, then the
/// first entry of a `presets` list
fn resolve_preset(ctx: &ActionContext, params: &Params, what: &str) -> Result<ParamValue> {
    if let Some(preset) = &ctx.preset_value {
        return Ok(preset.clone());
    }
    if let Some(preset) = params.opt_map("preset")? {
        return Ok(preset.clone());
    }
    if let Some(first) = params.opt_list(PRESETS_KEY)?.and_then(|p| p.first()) {
        return Ok(first.clone());
    }
    bail!("No {} preset provided", what)
}

fn preset_str<'a>(preset: &'a ParamValue, key: &str) -> Option<&'a str> {
    preset.get(key).and_then(|v| v.as_str())
}

/// Toggle a light
pub struct HaToggle;

#[async_trait]
impl Action for HaToggle {
    fn name(&self) -> &str {
        "ha_toggle"
    }

    fn description(&self) -> &str {
        "Toggle a Home Assistant light"
    }

    async fn invoke(&self, ctx: ActionContext, params: Params) -> Result<()> {
        let ha = ctx.ha()?;
        let entity_id = params.str("entity_id")?;

        ha.toggle_light(entity_id)
            .await
            .with_context(|| format!("Error toggling {}", entity_id))?;
        info!("  -> Toggled {}", entity_id);
        Ok(())
    }
}

/// Set light brightness from a `{percent, label}` preset
pub struct HaBrightness;

#[async_trait]
impl Action for HaBrightness {
    fn name(&self) -> &str {
        "ha_brightness"
    }

    fn description(&self) -> &str {
        "Set Home Assistant light brightness"
    }

    async fn invoke(&self, ctx: ActionContext, params: Params) -> Result<()> {
        let ha = ctx.ha()?;
        let entity_id = params.str("entity_id")?;
        let preset = resolve_preset(&ctx, &params, "brightness")?;

        let percent = preset
            .get("percent")
            .and_then(|v| v.as_i64())
            .unwrap_or(100)
            .clamp(0, 100) as u8;
        let label = preset_str(&preset, "label")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}%", percent));

        ha.set_brightness(entity_id, percent)
            .await
            .with_context(|| format!("Error setting brightness on {}", entity_id))?;
        info!("  -> Set {} to {} brightness", entity_id, label);
        Ok(())
    }
}

/// Set light RGB color from a `{rgb: [r, g, b], name}` preset
pub struct HaColor;

#[async_trait]
impl Action for HaColor {
    fn name(&self) -> &str {
        "ha_color"
    }

    fn description(&self) -> &str {
        "Set Home Assistant light RGB color"
    }

    async fn invoke(&self, ctx: ActionContext, params: Params) -> Result<()> {
        let ha = ctx.ha()?;
        let entity_id = params.str("entity_id")?;
        let preset = resolve_preset(&ctx, &params, "color")?;

        let rgb = parse_rgb(&preset)?;
        let name = preset_str(&preset, "name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", rgb));

        ha.set_color(entity_id, rgb)
            .await
            .with_context(|| format!("Error setting color on {}", entity_id))?;
        info!("  -> Set {} to {}", entity_id, name);
        Ok(())
    }
}

fn parse_rgb(preset: &ParamValue) -> Result<[u8; 3]> {
    let items = preset
        .get("rgb")
        .and_then(|v| v.as_list())
        .ok_or_else(|| anyhow!("Preset has no RGB value"))?;

    match items {
        [r, g, b] => {
            let channel = |v: &ParamValue| {
                v.as_i64()
                    .and_then(|c| u8::try_from(c).ok())
                    .ok_or_else(|| anyhow!("RGB components must be integers 0-255, got {}", v))
            };
            Ok([channel(r)?, channel(g)?, channel(b)?])
        }
        _ => bail!("RGB value must have exactly 3 components, got {}", items.len()),
    }
}

/// Set light color temperature from a `{kelvin, name}` preset
pub struct HaColorTemp;

#[async_trait]
impl Action for HaColorTemp {
    fn name(&self) -> &str {
        "ha_color_temp"
    }

    fn description(&self) -> &str {
        "Set Home Assistant light color temperature"
    }

    async fn invoke(&self, ctx: ActionContext, params: Params) -> Result<()> {
        let ha = ctx.ha()?;
        let entity_id = params.str("entity_id")?;
        let preset = resolve_preset(&ctx, &params, "color temperature")?;

        let kelvin = preset
            .get("kelvin")
            .and_then(|v| v.as_i64())
            .and_then(|k| u32::try_from(k).ok())
            .ok_or_else(|| anyhow!("Preset has no kelvin value"))?;
        let name = preset_str(&preset, "name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}K", kelvin));

        ha.set_color_temp(entity_id, kelvin)
            .await
            .with_context(|| format!("Error setting color temperature on {}", entity_id))?;
        info!("  -> Set {} to {} ({}K)", entity_id, name, kelvin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homeassistant::HaClient;
    use crate::midi::MidiEvent;
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn preset(pairs: &[(&str, ParamValue)]) -> ParamValue {
        ParamValue::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn ctx_with(ha: Option<HaClient>) -> ActionContext {
        let mut ctx = ActionContext::new(
            "pad",
            MidiEvent::ControlChange { channel: 0, control: 7, value: 127 },
        );
        ctx.ha = ha.map(Arc::new);
        ctx
    }

    #[tokio::test]
    async fn test_toggle_without_ha_fails() {
        let params = Params::new().with("entity_id", "light.x");
        let err = HaToggle.invoke(ctx_with(None), params).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_toggle_requires_entity_id() {
        let server = mockito::Server::new_async().await;
        let ha = HaClient::new(&server.url(), "t").unwrap();
        let err = HaToggle.invoke(ctx_with(Some(ha)), Params::new()).await.unwrap_err();
        assert!(err.to_string().contains("entity_id"));
    }

    #[tokio::test]
    async fn test_color_temp_uses_cycle_preset() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/light/turn_on")
            .match_body(Matcher::Json(json!({
                "entity_id": "light.desk",
                "color_temp_kelvin": 2700
            })))
            .with_status(200)
            .create_async()
            .await;

        let mut ctx = ctx_with(Some(HaClient::new(&server.url(), "t").unwrap()));
        ctx.cycle_index = Some(0);
        ctx.preset_value = Some(preset(&[("kelvin", ParamValue::Int(2700))]));

        HaColorTemp
            .invoke(ctx, Params::new().with("entity_id", "light.desk"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_brightness_falls_back_to_first_preset() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/light/turn_on")
            .match_body(Matcher::Json(json!({
                "entity_id": "light.desk",
                "brightness_pct": 25
            })))
            .with_status(200)
            .create_async()
            .await;

        let params = Params::new().with("entity_id", "light.desk").with(
            PRESETS_KEY,
            vec![
                preset(&[("percent", ParamValue::Int(25))]),
                preset(&[("percent", ParamValue::Int(75))]),
            ],
        );

        HaBrightness
            .invoke(ctx_with(Some(HaClient::new(&server.url(), "t").unwrap())), params)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_color_without_preset_fails() {
        let server = mockito::Server::new_async().await;
        let ha = HaClient::new(&server.url(), "t").unwrap();
        let err = HaColor
            .invoke(ctx_with(Some(ha)), Params::new().with("entity_id", "light.x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No color preset provided");
    }

    #[test]
    fn test_parse_rgb() {
        let ok = preset(&[(
            "rgb",
            vec![ParamValue::Int(255), ParamValue::Int(128), ParamValue::Int(0)].into(),
        )]);
        assert_eq!(parse_rgb(&ok).unwrap(), [255, 128, 0]);

        let short = preset(&[("rgb", vec![ParamValue::Int(1)].into())]);
        assert!(parse_rgb(&short).is_err());

        let out_of_range = preset(&[(
            "rgb",
            vec![ParamValue::Int(256), ParamValue::Int(0), ParamValue::Int(0)].into(),
        )]);
        assert!(parse_rgb(&out_of_range).is_err());

        assert!(parse_rgb(&preset(&[])).is_err());
    }
}
