use std::collections::HashMap;

use crate::error::ArgumentError;

/// Query-string parameters as a string-keyed multi-value map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs {
    values: HashMap<String, Vec<String>>,
}

impl QueryArgs {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            values.entry(key).or_default().push(value);
        }
        Self { values }
    }

    /// Every value supplied for `name`, in query order.
    pub fn all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reject any parameter not listed in `allowed`.
    pub fn allow_only(&self, allowed: &[&str]) -> Result<(), ArgumentError> {
        let mut unexpected: Vec<&String> = self
            .values
            .keys()
            .filter(|key| !allowed.contains(&key.as_str()))
            .collect();
        unexpected.sort();

        match unexpected.first() {
            Some(name) => Err(ArgumentError::Unexpected {
                name: (*name).clone(),
            }),
            None => Ok(()),
        }
    }

    /// The single value of a mandatory parameter.
    pub fn required(&self, name: &str) -> Result<&str, ArgumentError> {
        match self.all(name) {
            [] => Err(ArgumentError::Missing {
                name: name.to_string(),
            }),
            [value] => Ok(value.as_str()),
            values => Err(ArgumentError::Repeated {
                name: name.to_string(),
                count: values.len(),
            }),
        }
    }

    /// A mandatory `true`/`false` parameter (case-insensitive).
    pub fn required_bool(&self, name: &str) -> Result<bool, ArgumentError> {
        let value = self.required(name)?;
        if value.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if value.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(ArgumentError::Invalid {
                name: name.to_string(),
                value: value.to_string(),
                expected: "'true' or 'false'",
            })
        }
    }

    /// A mandatory non-negative integer parameter.
    pub fn required_index(&self, name: &str) -> Result<usize, ArgumentError> {
        let value = self.required(name)?;
        value.trim().parse().map_err(|_| ArgumentError::Invalid {
            name: name.to_string(),
            value: value.to_string(),
            expected: "a non-negative integer",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> QueryArgs {
        QueryArgs::from_pairs(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
    }

    #[test]
    fn test_repeated_keys_collect_all_values() {
        let query = args(&[("flag", "true"), ("flag", "false")]);
        assert_eq!(query.all("flag"), ["true", "false"]);
        assert!(matches!(
            query.required("flag"),
            Err(ArgumentError::Repeated { count: 2, .. })
        ));
    }

    #[test]
    fn test_required_bool() {
        assert_eq!(args(&[("flag", "true")]).required_bool("flag"), Ok(true));
        assert_eq!(args(&[("flag", "FALSE")]).required_bool("flag"), Ok(false));
        assert!(matches!(
            args(&[("flag", "banana")]).required_bool("flag"),
            Err(ArgumentError::Invalid { .. })
        ));
        assert!(matches!(
            args(&[]).required_bool("flag"),
            Err(ArgumentError::Missing { .. })
        ));
    }

    #[test]
    fn test_required_index_rejects_negative() {
        assert_eq!(args(&[("index", "2")]).required_index("index"), Ok(2));
        assert!(args(&[("index", "-1")]).required_index("index").is_err());
        assert!(args(&[("index", "two")]).required_index("index").is_err());
    }

    #[test]
    fn test_allow_only_names_first_unexpected_key() {
        let query = args(&[("flag", "true"), ("zeta", "1"), ("alpha", "2")]);
        assert_eq!(
            query.allow_only(&["flag"]),
            Err(ArgumentError::Unexpected {
                name: "alpha".to_string()
            })
        );
        assert!(args(&[]).allow_only(&[]).is_ok());
    }
}
