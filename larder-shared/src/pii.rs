use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Personal data (emails, contact names) that must not leak through `{:?}` or
/// `{}` in log lines. Serialization still emits the real value because API
/// responses and storage need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Masked({})", self)
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // keep the first character so operators can tell records apart
        match self.0.to_string().chars().next() {
            Some(first) => write!(f, "{}****", first),
            None => write!(f, "****"),
        }
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_value_in_logs() {
        let email = Masked::new("compras@bar-pepe.es".to_string());
        assert_eq!(format!("{}", email), "c****");
        assert_eq!(format!("{:?}", email), "Masked(c****)");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"compras@bar-pepe.es\"");
    }
}
