use std::sync::Arc;

use bytes::Bytes;
use proven_announcement::Bucket;
use serde_json::Value;

/// Splits one call argument into named segments.
///
/// Strategies are tried in order; the first to return `Some` wins. An
/// argument no strategy claims becomes a single segment named after it.
pub trait SegmentationStrategy: Send + Sync {
    /// Segments for `argument`, or `None` to defer to the next strategy.
    fn segment(&self, operation: &str, argument: &str, value: &Bytes) -> Option<Bucket>;
}

/// Splits JSON object arguments into one `<argument>.<field>` segment per
/// top-level field, so key filters can route individual fields.
#[derive(Clone, Debug, Default)]
pub struct JsonFieldSegmentation {
    arguments: Option<Vec<String>>,
}

impl JsonFieldSegmentation {
    /// Splits every JSON object argument.
    #[must_use]
    pub const fn new() -> Self {
        Self { arguments: None }
    }

    /// Splits only the named arguments.
    #[must_use]
    pub fn only<I, S>(arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            arguments: Some(arguments.into_iter().map(Into::into).collect()),
        }
    }
}

impl SegmentationStrategy for JsonFieldSegmentation {
    fn segment(&self, _operation: &str, argument: &str, value: &Bytes) -> Option<Bucket> {
        if let Some(arguments) = &self.arguments {
            if !arguments.iter().any(|name| name == argument) {
                return None;
            }
        }

        let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(value) else {
            return None;
        };

        Some(
            fields
                .into_iter()
                .map(|(field, value)| {
                    (
                        format!("{argument}.{field}"),
                        Bytes::from(value.to_string()),
                    )
                })
                .collect(),
        )
    }
}

pub(crate) fn segment_arguments(
    strategies: &[Arc<dyn SegmentationStrategy>],
    operation: &str,
    arguments: &[(String, Bytes)],
) -> Bucket {
    arguments
        .iter()
        .fold(Bucket::new(), |bucket, (argument, value)| {
            let segments = strategies
                .iter()
                .find_map(|strategy| strategy.segment(operation, argument, value))
                .unwrap_or_else(|| Bucket::new().with(argument.clone(), value.clone()));

            segments
                .into_iter()
                .fold(bucket, |bucket, (key, value)| bucket.with(key, value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_object_split_into_fields() {
        let bucket = JsonFieldSegmentation::new()
            .segment("Register", "user", &Bytes::from(r#"{"email":"a@b.c","age":3}"#))
            .unwrap();

        assert_eq!(bucket.get("user.email"), Some(&Bytes::from(r#""a@b.c""#)));
        assert_eq!(bucket.get("user.age"), Some(&Bytes::from("3")));
    }

    #[test]
    fn test_non_objects_are_deferred() {
        let strategy = JsonFieldSegmentation::new();

        assert!(strategy.segment("Hello", "message", &Bytes::from("Hi")).is_none());
        assert!(strategy.segment("Hello", "list", &Bytes::from("[1,2]")).is_none());
    }

    #[test]
    fn test_only_named_arguments() {
        let strategy = JsonFieldSegmentation::only(["user"]);

        assert!(strategy.segment("Register", "other", &Bytes::from("{}")).is_none());
        assert!(strategy.segment("Register", "user", &Bytes::from("{}")).is_some());
    }

    #[test]
    fn test_unclaimed_arguments_keep_their_name() {
        let strategies: Vec<Arc<dyn SegmentationStrategy>> =
            vec![Arc::new(JsonFieldSegmentation::only(["user"]))];
        let arguments = vec![
            ("user".to_string(), Bytes::from(r#"{"name":"Ada"}"#)),
            ("note".to_string(), Bytes::from("plain")),
        ];

        let bucket = segment_arguments(&strategies, "Register", &arguments);

        assert_eq!(bucket.keys().collect::<Vec<_>>(), vec!["note", "user.name"]);
    }
}
