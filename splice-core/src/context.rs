//! Per-call invocation snapshot.

use crate::{method::MethodKey, value::Value};
use std::{any::Any, fmt};

/// An immutable view of one intercepted call.
///
/// Built by the trampoline for the duration of a single dispatch and handed
/// by reference to every module capability. The result slot is not part of
/// the context; the after phase receives it separately as `&mut Value`.
#[derive(Clone, Copy)]
pub struct InvocationContext<'a> {
    method: &'a MethodKey,
    receiver: Option<&'a dyn Any>,
    args: &'a [Value],
}

impl<'a> InvocationContext<'a> {
    /// A call to `method` with `args` and no receiver (static method).
    pub fn new(method: &'a MethodKey, args: &'a [Value]) -> Self {
        Self {
            method,
            receiver: None,
            args,
        }
    }

    /// Attach the receiver instance.
    pub fn with_receiver(mut self, receiver: &'a dyn Any) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// The target method.
    pub fn method(&self) -> &'a MethodKey {
        self.method
    }

    /// The receiver instance, if the method is not static.
    pub fn receiver(&self) -> Option<&'a dyn Any> {
        self.receiver
    }

    /// Downcast the receiver.
    pub fn receiver_as<T: Any>(&self) -> Option<&'a T> {
        self.receiver.and_then(|r| r.downcast_ref())
    }

    /// The call arguments.
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// Argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }
}

impl fmt::Debug for InvocationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("method", self.method)
            .field("has_receiver", &self.receiver.is_some())
            .field("args", &self.args)
            .finish()
    }
}
