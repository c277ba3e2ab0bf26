//! Query parameter validator registry.
//!
//! Each registered parameter has an ordered list of validators: a shape check
//! (length and character class) first, and for structured parameters a JSON
//! check second. Names match case-insensitively; values match exactly.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// A single pure predicate over a raw parameter value.
#[derive(Debug, Clone)]
pub enum ParameterValidator {
    /// Value must match the anchored pattern.
    Regex(Regex),
    /// Value must parse as a JSON document.
    Json,
}

impl ParameterValidator {
    pub fn is_valid(&self, value: &str) -> bool {
        match self {
            ParameterValidator::Regex(re) => re.is_match(value),
            ParameterValidator::Json => serde_json::from_str::<serde_json::Value>(value).is_ok(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorRule {
    pub parameter_name: &'static str,
    pub validators: Vec<ParameterValidator>,
}

impl ValidatorRule {
    /// Run validators in order, stopping at the first failure.
    pub fn check(&self, value: &str) -> bool {
        self.validators.iter().all(|v| v.is_valid(value))
    }
}

fn shape(pattern: &str) -> ParameterValidator {
    // Patterns are compile-time constants exercised by the tests below.
    ParameterValidator::Regex(Regex::new(pattern).expect("validator pattern compiles"))
}

const BOOLEAN: &str = r"^(true|false)$";

/// Parameter table: name, shape pattern, whether the value must also be JSON.
const PARAMETER_TABLE: &[(&str, &str, bool)] = &[
    ("allowedPaymentMethods", r"^.{1,1500}$", true),
    ("billableAccountId", r"^.{1,100}$", false),
    ("classicProduct", r"^[a-z]{1,30}$", false),
    ("complete", BOOLEAN, false),
    ("completePrerequisites", BOOLEAN, false),
    ("country", r"^[a-z]{2}$", false),
    ("deviceId", r"^\d{16}$", false),
    ("deviceIdFilter", BOOLEAN, false),
    ("family", r"^\w{1,25}$", false),
    ("filters", r"^.{1,500}$", true),
    ("ignoreMissingTaxId", BOOLEAN, false),
    ("language", r"^[-\w,]{1,200}$", false),
    ("operation", r"^[a-z]{1,25}$", false),
    ("orderId", r"^[-\da-z]{1,50}$", false),
    ("partner", r"^\w{1,25}$", false),
    ("paymentSessionData", r"^.{1,2048}$", true),
    ("paymentSessionOrData", r"^.{1,2048}$", true),
    ("piid", r"^[-+\da-z]{1,50}$", false),
    ("revertChallengeOption", BOOLEAN, false),
    ("scenario", r"^\w{1,35}$", false),
    ("sessionId", r"^[-\da-z]{1,60}$", false),
    ("status", r"^[a-z]{1,15}$", false),
    ("timezoneOffset", r"^[-\d]{1,6}$", false),
    ("type", r"^[-\w,\s]{1,100}$", false),
];

/// Default registry, built once.
static DEFAULT_VALIDATORS: LazyLock<ParameterValidators> = LazyLock::new(|| {
    ParameterValidators::new(PARAMETER_TABLE.iter().map(|(name, pattern, json)| {
        let mut validators = vec![shape(pattern)];
        if *json {
            validators.push(ParameterValidator::Json);
        }
        ValidatorRule {
            parameter_name: name,
            validators,
        }
    }))
});

/// Immutable map from parameter name to its rule.
#[derive(Debug, Clone, Default)]
pub struct ParameterValidators {
    rules: HashMap<String, ValidatorRule>,
}

impl ParameterValidators {
    pub fn new(rules: impl IntoIterator<Item = ValidatorRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|r| (r.parameter_name.to_ascii_lowercase(), r))
                .collect(),
        }
    }

    /// The registry shipped with the gateway.
    pub fn standard() -> &'static ParameterValidators {
        &DEFAULT_VALIDATORS
    }

    pub fn rule(&self, parameter_name: &str) -> Option<&ValidatorRule> {
        self.rules.get(&parameter_name.to_ascii_lowercase())
    }

    pub fn is_registered(&self, parameter_name: &str) -> bool {
        self.rule(parameter_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
