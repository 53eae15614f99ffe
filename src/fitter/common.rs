#[derive(PartialEq, Default, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Data {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Per point uncertainty on `y`.
    pub sigma: Vec<f64>,
    /// Bin edges for each point, used when the model is averaged over the bin.
    pub bins: Vec<(f64, f64)>,
}

impl Data {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[derive(PartialEq, Default, Debug, Clone, Copy, serde::Deserialize, serde::Serialize)]
pub struct Value {
    pub value: f64,
    pub uncertainty: f64,
}

impl Value {
    pub fn new(value: f64, uncertainty: f64) -> Self {
        Self { value, uncertainty }
    }
}

#[derive(PartialEq, Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Parameter {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub initial_guess: f64,
    pub vary: bool,
    pub value: Option<f64>,
    pub uncertainty: Option<f64>,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            name: String::new(),
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            initial_guess: 0.0,
            vary: true,
            value: None,
            uncertainty: None,
        }
    }
}

impl Parameter {
    pub fn new(name: &str, initial_guess: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_owned(),
            min,
            max,
            initial_guess,
            ..Default::default()
        }
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }

    pub fn is_within_bounds(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }

    /// Fitted value, or the initial guess if the parameter was never fitted.
    pub fn fitted(&self) -> f64 {
        self.value.unwrap_or(self.initial_guess)
    }

    pub fn error(&self) -> f64 {
        self.uncertainty.unwrap_or(0.0)
    }

    pub fn as_value(&self) -> Value {
        Value::new(self.fitted(), self.error())
    }
}
