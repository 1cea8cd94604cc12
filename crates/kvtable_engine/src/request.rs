//! Single-settlement request handles.
//!
//! Every engine operation returns a [`Request`]. The engine settles it exactly
//! once through the paired [`Responder`]; the caller awaits it.

use crate::error::{EngineError, EngineResult};
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Pending outcome of one engine operation.
#[must_use = "requests do nothing unless awaited"]
#[derive(Debug)]
pub struct Request<T> {
    inner: Inner<T>,
}

#[derive(Debug)]
enum Inner<T> {
    Ready(Option<EngineResult<T>>),
    Pending(oneshot::Receiver<EngineResult<T>>),
}

/// Settling side of a [`Request`].
///
/// Dropping it without settling resolves the request with
/// [`EngineError::RequestDropped`].
#[derive(Debug)]
pub struct Responder<T> {
    sender: oneshot::Sender<EngineResult<T>>,
}

impl<T> Request<T> {
    /// A request that has already settled.
    pub fn ready(result: EngineResult<T>) -> Self {
        Self {
            inner: Inner::Ready(Some(result)),
        }
    }

    /// A request settled later through the returned responder.
    pub fn pending() -> (Responder<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            Responder { sender },
            Self {
                inner: Inner::Pending(receiver),
            },
        )
    }
}

impl<T> Responder<T> {
    /// Settles the request. Has no effect if the request was dropped.
    pub fn settle(self, result: EngineResult<T>) {
        let _ = self.sender.send(result);
    }
}

impl<T> Unpin for Request<T> {}

impl<T> Future for Request<T> {
    type Output = EngineResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(EngineError::RequestDropped)))
            }
            Inner::Pending(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(EngineError::RequestDropped)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_request() {
        assert_eq!(Request::ready(Ok(7)).await, Ok(7));
    }

    #[tokio::test]
    async fn settled_from_another_task() {
        let (responder, request) = Request::pending();
        tokio::spawn(async move { responder.settle(Ok("done")) });
        assert_eq!(request.await, Ok("done"));
    }

    #[tokio::test]
    async fn dropped_responder() {
        let (responder, request) = Request::<()>::pending();
        drop(responder);
        assert_eq!(request.await, Err(EngineError::RequestDropped));
    }
}
