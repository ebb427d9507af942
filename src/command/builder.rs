use crate::{
    command::{Callback, Command, CommandError, Operation},
    validate::ValidationError,
};

/// Options every builder carries regardless of kind.
pub struct BuilderCore<T> {
    callback: Option<Callback<T>>,
    max_retries: Option<u32>,
}

impl<T> Default for BuilderCore<T> {
    fn default() -> Self {
        Self {
            callback: None,
            max_retries: None,
        }
    }
}

impl<T: Send + 'static> BuilderCore<T> {
    /// Moves the callback out ahead of option validation; the callback is never
    /// part of the validated option set.
    pub fn take_callback(&mut self) -> Result<Callback<T>, ValidationError> {
        self.callback
            .take()
            .ok_or_else(|| ValidationError::missing("callback"))
    }

    pub fn finish<O>(self, callback: Callback<T>, op: O) -> Command<O>
    where
        O: Operation<Output = T>,
    {
        Command::new(op, callback, self.max_retries)
    }
}

/// Fluent accumulator shared by every kind's builder.
///
/// `build` consumes the builder, validates what was collected and returns a
/// command that can be executed. Nothing is sent over the network here.
pub trait CommandBuilder: Sized {
    type Operation: Operation;

    fn core_mut(&mut self) -> &mut BuilderCore<<Self::Operation as Operation>::Output>;

    fn build(self) -> Result<Command<Self::Operation>, ValidationError>;

    fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<<Self::Operation as Operation>::Output, CommandError>) + Send + 'static,
    {
        let callback: Callback<<Self::Operation as Operation>::Output> = Box::new(callback);
        self.core_mut().callback = Some(callback);
        self
    }

    /// Overrides the kind's default retry budget.
    fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.core_mut().max_retries = Some(max_retries);
        self
    }
}
