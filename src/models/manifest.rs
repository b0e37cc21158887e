use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// `manifest.json` of a generator model.
#[derive(Debug, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Length of the latent vector the generator consumes.
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,
    pub shaders: ShaderPaths,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamDef>,
}

#[derive(Debug, Deserialize)]
pub struct ShaderPaths {
    pub fragment: String,
}

/// A tunable generator constant, emitted into WGSL as `PARAM_<NAME>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamDef {
    Int {
        default: i64,
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    Float {
        default: f64,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Bool {
        default: bool,
    },
    /// RGB in 0..1; overridden as `r:g:b`.
    Color {
        default: [f64; 3],
    },
}

impl ParamDef {
    /// WGSL `const` lines for this parameter. An override that fails to parse
    /// falls back to the default; numeric values are clamped to `min..=max`.
    pub fn wgsl_consts(&self, name: &str, value: Option<&str>) -> String {
        let upper = name.to_uppercase();
        let mut out = String::new();
        match *self {
            ParamDef::Int { default, min, max } => {
                let v = value.and_then(|v| v.parse().ok()).unwrap_or(default);
                let v = v.max(min.unwrap_or(i64::MIN)).min(max.unwrap_or(i64::MAX));
                let v = v.clamp(i32::MIN as i64, i32::MAX as i64);
                let _ = writeln!(out, "const PARAM_{}: i32 = {};", upper, v);
            }
            ParamDef::Float { default, min, max } => {
                let v = value
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .unwrap_or(default);
                let v = v.max(min.unwrap_or(f64::NEG_INFINITY)).min(max.unwrap_or(f64::INFINITY));
                let v = v.clamp(f32::MIN as f64, f32::MAX as f64);
                let _ = writeln!(out, "const PARAM_{}: f32 = {:.6};", upper, v);
            }
            ParamDef::Bool { default } => {
                let v = value.map_or(default, |v| v == "true" || v == "1");
                let _ = writeln!(out, "const PARAM_{}: i32 = {};", upper, v as i32);
            }
            ParamDef::Color { default } => {
                let rgb = value.and_then(parse_color).unwrap_or(default);
                for (channel, v) in ["R", "G", "B"].iter().zip(rgb) {
                    let _ = writeln!(out, "const PARAM_{}_{}: f32 = {:.6};", upper, channel, v);
                }
            }
        }
        out
    }
}

fn parse_color(value: &str) -> Option<[f64; 3]> {
    let parts: Vec<f64> = value
        .split(':')
        .map(|s| s.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;
    match parts[..] {
        [r, g, b] => Some([r, g, b]),
        _ => None,
    }
}

fn default_latent_dim() -> usize {
    512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_clamped() {
        let def = ParamDef::Int { default: 4, min: Some(1), max: Some(8) };
        assert_eq!(def.wgsl_consts("octaves", None), "const PARAM_OCTAVES: i32 = 4;\n");
        assert_eq!(def.wgsl_consts("octaves", Some("99")), "const PARAM_OCTAVES: i32 = 8;\n");
        assert_eq!(def.wgsl_consts("octaves", Some("x")), "const PARAM_OCTAVES: i32 = 4;\n");
    }

    #[test]
    fn test_unbounded_int_fits_i32() {
        let def = ParamDef::Int { default: 1, min: None, max: None };
        assert_eq!(
            def.wgsl_consts("n", Some("9999999999")),
            "const PARAM_N: i32 = 2147483647;\n"
        );
        assert_eq!(
            def.wgsl_consts("n", Some("-9999999999")),
            "const PARAM_N: i32 = -2147483648;\n"
        );
    }

    #[test]
    fn test_non_finite_float_falls_back() {
        let def = ParamDef::Float { default: 1.5, min: None, max: None };
        for bad in ["inf", "-inf", "NaN"] {
            assert_eq!(def.wgsl_consts("gain", Some(bad)), "const PARAM_GAIN: f32 = 1.500000;\n");
        }
        let tint = ParamDef::Color { default: [0.25, 0.25, 0.25] };
        assert!(tint.wgsl_consts("tint", Some("inf:0:0")).contains("PARAM_TINT_R: f32 = 0.250000;"));
    }

    #[test]
    fn test_color_override() {
        let def = ParamDef::Color { default: [0.0, 0.0, 0.0] };
        let src = def.wgsl_consts("tint", Some("1:0.5:0"));
        assert!(src.contains("const PARAM_TINT_R: f32 = 1.000000;"));
        assert!(src.contains("const PARAM_TINT_G: f32 = 0.500000;"));
        // wrong arity keeps the default
        assert!(def.wgsl_consts("tint", Some("1:2")).contains("PARAM_TINT_B: f32 = 0.000000;"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{ "type": "vec4", "default": 1 }"#;
        assert!(serde_json::from_str::<ParamDef>(json).is_err());
    }
}
