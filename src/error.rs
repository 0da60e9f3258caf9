use thiserror::Error;

/// Failures that cross module boundaries. Translation misses are not an
/// error (they surface as `Translation::NoMatch`), and io/json problems are
/// absorbed where they occur.
#[derive(Error, Debug)]
pub enum AskdbError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

pub type Result<T> = std::result::Result<T, AskdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_subsystem() {
        assert_eq!(
            AskdbError::Database("connection refused".to_string()).to_string(),
            "Database error: connection refused"
        );
        assert_eq!(
            AskdbError::Llm("status 503".to_string()).to_string(),
            "LLM error: status 503"
        );
    }
}
