//! The seam to the external transformation engines.
//!
//! Billing never looks at payloads. An engine runs only after the charge for
//! its operation has been committed, outside the account's critical section.

use async_trait::async_trait;
use thiserror::Error;

use paygate_core::{OperationResult, Result, UserId};

use super::gate::OperationGate;

/// Failure reported by a transformation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine does not implement this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The input could not be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The engine itself failed.
    #[error("engine failure: {0}")]
    Failed(String),
}

/// Something that performs a billable operation on opaque bytes.
#[async_trait]
pub trait TransformationEngine: Send + Sync {
    /// Run `operation` over `input`.
    async fn run(&self, operation: &str, input: Vec<u8>) -> std::result::Result<Vec<u8>, EngineError>;
}

/// Outcome of a metered engine run.
#[derive(Debug)]
pub enum MeteredRun {
    /// Charged and processed.
    Completed {
        /// The committed charge.
        charge: OperationResult,
        /// Engine output.
        output: Vec<u8>,
    },
    /// The charge was refused; the engine was not called.
    Refused(OperationResult),
    /// Charged, but the engine failed. The charge stands.
    EngineFailed {
        /// The committed charge.
        charge: OperationResult,
        /// What went wrong.
        error: EngineError,
    },
}

/// Charge `operation` for `user_id` and, only if that succeeded, run it.
///
/// # Errors
///
/// Propagates the gate's infrastructure errors; the engine is not called then.
pub async fn run_metered(
    gate: &OperationGate,
    engine: &dyn TransformationEngine,
    user_id: &UserId,
    operation: &str,
    input: Vec<u8>,
) -> Result<MeteredRun> {
    let charge = gate.process_operation(user_id, operation).await?;
    if !charge.success {
        return Ok(MeteredRun::Refused(charge));
    }

    match engine.run(operation, input).await {
        Ok(output) => Ok(MeteredRun::Completed { charge, output }),
        Err(error) => {
            tracing::warn!(
                user_id = %user_id,
                operation = %operation,
                error = %error,
                "Engine failed after charge"
            );
            Ok(MeteredRun::EngineFailed { charge, error })
        }
    }
}
