use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Binds the age calculator to a birthdate input and a read-only age field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgeBinding {
    pub birthdate: String,
    pub age: String,
}

/// Binds the BMI calculator to height/weight inputs and a read-only BMI field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BmiBinding {
    pub height: String,
    pub weight: String,
    pub bmi: String,
}

/// The five fall-risk signals plus the labels used for the classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FallRiskBinding {
    pub history: String,
    pub unsteady: String,
    pub fear: String,
    pub count: String,
    pub injury: String,
    #[serde(default = "default_positive_values")]
    pub positive_values: Vec<String>,
    #[serde(default = "default_present_label")]
    pub present_label: String,
    #[serde(default = "default_low_label")]
    pub low_label: String,
    /// Optional read-only field that mirrors the classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

fn default_positive_values() -> Vec<String> {
    vec!["はい".into(), "あり".into()]
}

fn default_present_label() -> String {
    "転倒リスクあり".into()
}

fn default_low_label() -> String {
    "転倒リスク低".into()
}

/// Derived fields computed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DerivedSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<AgeBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<BmiBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fall_risk: Option<FallRiskBinding>,
}

impl DerivedSpec {
    /// Fields the engine writes; hosts must not edit them.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets = Vec::new();
        if let Some(age) = &self.age {
            targets.push(age.age.as_str());
        }
        if let Some(bmi) = &self.bmi {
            targets.push(bmi.bmi.as_str());
        }
        if let Some(output) = self
            .fall_risk
            .as_ref()
            .and_then(|binding| binding.output.as_deref())
        {
            targets.push(output);
        }
        targets
    }

    /// Every field name the bindings refer to.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(age) = &self.age {
            names.extend([age.birthdate.as_str(), age.age.as_str()]);
        }
        if let Some(bmi) = &self.bmi {
            names.extend([bmi.height.as_str(), bmi.weight.as_str(), bmi.bmi.as_str()]);
        }
        if let Some(risk) = &self.fall_risk {
            names.extend([
                risk.history.as_str(),
                risk.unsteady.as_str(),
                risk.fear.as_str(),
                risk.count.as_str(),
                risk.injury.as_str(),
            ]);
            if let Some(output) = &risk.output {
                names.push(output.as_str());
            }
        }
        names
    }
}
