pub struct EmbeddedModel {
    pub manifest_json: &'static str,
    pub fragment_wgsl: &'static str,
}

/// Generators compiled into the binary, used when no `models/` directory is
/// found next to the executable or the crate.
pub fn embedded_models() -> &'static [(&'static str, EmbeddedModel)] {
    &[(
        "latent_field",
        EmbeddedModel {
            manifest_json: include_str!("../../models/latent_field/manifest.json"),
            fragment_wgsl: include_str!("../../models/latent_field/main.wgsl"),
        },
    )]
}

pub fn embedded_model(name: &str) -> Option<&'static EmbeddedModel> {
    embedded_models()
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, model)| model)
}
