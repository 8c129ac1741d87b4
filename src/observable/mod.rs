// Observation layer
//
// Reactive objects own a `Source`; reads report to the active
// `BindingObserver` through a thread-local tracker cell and writes notify the
// subscriber sets held in the notifier arena. Observers never update anything
// synchronously: a change queues one task on the scheduler, which later asks
// the observer's owner to pull the new value.

pub(crate) mod binding;
mod context;
mod list;
mod object;
mod source;
mod subscriber;

pub use binding::{Binding, BindingObserver, untracked};
pub use context::ExecutionContext;
pub(crate) use context::with_event;
pub use list::ObservableList;
pub use object::{Observable, ObservableType, PropertyDescriptor, TypeBuilder};
pub use source::Source;
pub use subscriber::{Change, Subscriber, SubscriberSet};
pub(crate) use subscriber::{notify_all, subscriber_addr};
