use std::future::Future;
use std::time::{Duration, Instant};

use mtp_errors::{Attempt, EngineError, FallbackAllFailed};

/// One rung of a fallback ladder (§4.10): a name for diagnostics and
/// an async attempt.
pub struct Rung<'a, T> {
    /// Shown in diagnostics and in `Attempt::name`.
    pub name: &'static str,
    /// The attempt itself.
    pub attempt: Box<dyn FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<T, EngineError>> + 'a>> + 'a>,
}

/// Outcome of a successful ladder execution.
pub struct LadderSuccess<T> {
    /// The value produced by the winning rung.
    pub value: T,
    /// The winning rung's name.
    pub winning_rung: &'static str,
    /// Every attempt made, in order, including the winner.
    pub attempts: Vec<Attempt>,
}

/// Execute `rungs` in order, short-circuiting on the first success
/// (§4.10). The ladder executor never retries within a rung -- retry
/// is itself a rung.
pub async fn execute<T>(mut rungs: Vec<Rung<'_, T>>) -> Result<LadderSuccess<T>, FallbackAllFailed> {
    let mut attempts = Vec::with_capacity(rungs.len());

    for rung in rungs.iter_mut() {
        let start = Instant::now();
        let result = (rung.attempt)().await;
        let duration = start.elapsed();
        match result {
            Ok(value) => {
                attempts.push(Attempt {
                    name: rung.name.to_string(),
                    duration,
                    succeeded: true,
                    error: None,
                });
                return Ok(LadderSuccess {
                    value,
                    winning_rung: rung.name,
                    attempts,
                });
            }
            Err(e) => {
                attempts.push(Attempt {
                    name: rung.name.to_string(),
                    duration,
                    succeeded: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    Err(FallbackAllFailed { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtp_errors::ProtocolError;

    fn failing_rung(name: &'static str) -> Rung<'static, u32> {
        Rung {
            name,
            attempt: Box::new(move || {
                Box::pin(async move {
                    Err(EngineError::Protocol(ProtocolError::ObjectNotFound))
                })
            }),
        }
    }

    fn succeeding_rung(name: &'static str, value: u32) -> Rung<'static, u32> {
        Rung {
            name,
            attempt: Box::new(move || Box::pin(async move { Ok(value) })),
        }
    }

    #[tokio::test]
    async fn short_circuits_on_first_success() {
        let rungs = vec![failing_rung("a"), succeeding_rung("b", 42), succeeding_rung("c", 0)];
        let result = execute(rungs).await.unwrap();
        assert_eq!(result.value, 42);
        assert_eq!(result.winning_rung, "b");
        assert_eq!(result.attempts.len(), 2);
    }

    #[tokio::test]
    async fn reports_every_attempt_when_all_fail() {
        let rungs = vec![failing_rung("a"), failing_rung("b")];
        let err = execute(rungs).await.unwrap_err();
        assert_eq!(err.attempts.len(), 2);
        assert!(err.attempts.iter().all(|a| !a.succeeded && a.error.is_some()));
    }
}
