//! # Novade Buffer Queue
//!
//! The producer endpoint of a surface buffer queue. A
//! [`BufferQueueProducer`] sits in front of a compositor-provided
//! [`BufferQueue`], serves local producers directly and decodes requests from
//! remote ones ([`dispatcher`]). Remote producers talk to it through a
//! [`ProducerProxy`] over any [`Transport`].

pub mod dispatcher;
pub mod producer;
pub mod proxy;
pub mod queue;

pub use dispatcher::{RequestCode, MAX_REQUEST_CODE};
pub use producer::BufferQueueProducer;
pub use proxy::{ProducerProxy, Transport};
pub use queue::{BufferQueue, ConsumerListener};
