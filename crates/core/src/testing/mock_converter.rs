//! Mock converter for testing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::converter::{
    describe, Artifact, ConvertError, Converter, ConverterDescriptor, Multiplicity, Operation,
    Params,
};
use crate::staging::{OutputSlot, StagedFile};

/// What the mock does when asked to validate or execute.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Concatenate every input (or write `mock` when there are none).
    #[default]
    Echo,
    /// Fail validation with this reason; execute is never reached.
    RejectValidation(String),
    /// Write a partial artifact, then fail with an engine error.
    FailAfterWriting(String),
    /// Report success without writing anything.
    WriteNothing,
    /// Sleep before echoing.
    Sleep(Duration),
    /// Panic inside execute.
    Panic,
}

/// A recorded execution for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedExecution {
    /// Client-facing names of the inputs.
    pub inputs: Vec<String>,
    /// Parameters received.
    pub params: Params,
    /// Token of the output slot.
    pub token: String,
}

/// Mock implementation of the Converter trait.
///
/// Registers under any [`Operation`], accepts any number of files of any
/// type and declares no parameters, so tests drive it purely through
/// [`MockBehavior`].
///
/// # Example
///
/// ```rust,ignore
/// use convertino_core::testing::{MockBehavior, MockConverter};
///
/// let converter = MockConverter::new(Operation::PdfMerge)
///     .with_behavior(MockBehavior::FailAfterWriting("boom".into()));
/// let registry = ConverterRegistry::empty().register(Arc::new(converter.clone()));
///
/// // ... run a job ...
///
/// assert_eq!(converter.executions(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    descriptor: ConverterDescriptor,
    behavior: Arc<Mutex<MockBehavior>>,
    recorded: Arc<Mutex<Vec<RecordedExecution>>>,
}

impl MockConverter {
    /// Create a new mock converter answering to `operation`.
    pub fn new(operation: Operation) -> Self {
        let mut descriptor = describe(operation);
        descriptor.inputs = Multiplicity::AtLeast { count: 0 };
        descriptor.extensions = &[];
        descriptor.params = Vec::new();
        Self {
            descriptor,
            behavior: Arc::new(Mutex::new(MockBehavior::Echo)),
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    /// Replace the behavior for subsequent calls.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Number of times execute was reached.
    pub fn executions(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }

    /// Get all recorded executions.
    pub fn recorded_executions(&self) -> Vec<RecordedExecution> {
        self.recorded.lock().unwrap().clone()
    }

    fn behavior(&self) -> MockBehavior {
        self.behavior.lock().unwrap().clone()
    }

    async fn echo(inputs: &[StagedFile], output: &OutputSlot) -> Result<(), ConvertError> {
        let mut content = Vec::new();
        for input in inputs {
            content.extend(tokio::fs::read(&input.path).await?);
        }
        if inputs.is_empty() {
            content.extend_from_slice(b"mock");
        }
        tokio::fs::write(output.scratch_path(), content).await?;
        Ok(())
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn descriptor(&self) -> &ConverterDescriptor {
        &self.descriptor
    }

    fn validate(&self, _inputs: &[StagedFile], _params: &Params) -> Result<(), ConvertError> {
        match self.behavior() {
            MockBehavior::RejectValidation(reason) => Err(ConvertError::validation(reason)),
            _ => Ok(()),
        }
    }

    fn output_name(&self, inputs: &[StagedFile], _params: &Params) -> String {
        inputs
            .first()
            .map(|f| f.original_name.clone())
            .unwrap_or_else(|| "mock.bin".to_string())
    }

    async fn execute(
        &self,
        inputs: &[StagedFile],
        output: &OutputSlot,
        params: &Params,
    ) -> Result<Artifact, ConvertError> {
        self.recorded.lock().unwrap().push(RecordedExecution {
            inputs: inputs.iter().map(|f| f.original_name.clone()).collect(),
            params: params.clone(),
            token: output.token().to_string(),
        });

        match self.behavior() {
            MockBehavior::Echo | MockBehavior::RejectValidation(_) => {
                Self::echo(inputs, output).await?;
            }
            MockBehavior::FailAfterWriting(detail) => {
                tokio::fs::write(output.scratch_path(), b"partial").await?;
                return Err(ConvertError::engine("mock", detail));
            }
            MockBehavior::WriteNothing => {}
            MockBehavior::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Self::echo(inputs, output).await?;
            }
            MockBehavior::Panic => panic!("mock converter panicked"),
        }

        Ok(Artifact::new("application/octet-stream"))
    }
}
