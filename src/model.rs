//! Model selection for the web frontend
//!
//! The web app picks a model through the `x-goog-ext-525001261-jspb` request
//! header. The opaque ids below are whatever the frontend currently sends and
//! change when Google rolls models over; `Unspecified` omits the header and
//! lets the server use the account default.

/// Header name carrying the model selection blob
pub const MODEL_HEADER: &str = "x-goog-ext-525001261-jspb";

/// Models selectable on gemini.google.com
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// Account default, no selection header sent
    Unspecified,
    G25Flash,
    G25Pro,
    /// Legacy id, kept while the frontend still accepts it
    G20Flash,
}

impl Model {
    /// All known models, in the order the frontend lists them
    pub const ALL: [Model; 4] = [
        Model::Unspecified,
        Model::G25Flash,
        Model::G25Pro,
        Model::G20Flash,
    ];

    /// Name used in logs and config values
    pub fn name(&self) -> &'static str {
        match self {
            Model::Unspecified => "unspecified",
            Model::G25Flash => "gemini-2.5-flash",
            Model::G25Pro => "gemini-2.5-pro",
            Model::G20Flash => "gemini-2.0-flash",
        }
    }

    /// Value for the model selection header, `None` for the default model
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            Model::Unspecified => None,
            Model::G25Flash => Some(r#"[1,null,null,null,"71c2d248d3b102ff"]"#),
            Model::G25Pro => Some(r#"[1,null,null,null,"2525e3954d185b3c"]"#),
            Model::G20Flash => Some(r#"[1,null,null,null,"f299729663a2343f"]"#),
        }
    }

    /// Whether the model is only served to Google AI Pro/Ultra accounts
    pub fn advanced_only(&self) -> bool {
        false
    }

    /// Look a model up by its config name
    pub fn from_name(name: &str) -> Option<Model> {
        Model::ALL.iter().copied().find(|m| m.name() == name)
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Unspecified
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_sends_no_header() {
        assert!(Model::default().header_value().is_none());
    }

    #[test]
    fn test_named_models_have_headers() {
        for model in Model::ALL {
            if model != Model::Unspecified {
                assert!(model.header_value().is_some(), "{model} missing header");
            }
        }
    }

    #[test]
    fn test_from_name_roundtrip() {
        for model in Model::ALL {
            assert_eq!(Model::from_name(model.name()), Some(model));
        }
        assert_eq!(Model::from_name("gpt-4"), None);
    }
}
