//! `futures::Stream` view over a readable.

use std::cell::RefCell;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::Stream;

use crate::callback::Callback;
use crate::error::{ProtocolViolation, StreamError};
use crate::stream::{Readable, Writable};

struct Bridge<T> {
    chunk: Option<T>,
    ack: Option<Callback>,
    outcome: Option<Result<(), StreamError>>,
    finished: bool,
    waker: Option<Waker>,
}

impl<T> Bridge<T> {
    fn wake(state: &RefCell<Self>) {
        let waker = state.borrow_mut().waker.take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Yields the chunks of a readable as a `Stream`.
///
/// The readable is piped into an internal writable whose write completions
/// are held until the consumer polls for the next item, so an idle consumer
/// applies backpressure all the way to the read hook. A failed or
/// prematurely closed pipe yields one `Err` item, then the stream ends.
/// Dropping the stream before it ends destroys the readable.
pub struct ReadableStream<T: 'static> {
    state: Rc<RefCell<Bridge<T>>>,
    sink: Writable<T>,
}

impl<T: 'static> fmt::Debug for ReadableStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("ReadableStream")
            .field("pending_chunk", &st.chunk.is_some())
            .field("finished", &st.finished)
            .finish()
    }
}

impl<T: 'static> ReadableStream<T> {
    pub fn new(readable: &Readable<T>) -> Result<Self, ProtocolViolation> {
        let state = Rc::new(RefCell::new(Bridge {
            chunk: None,
            ack: None,
            outcome: None,
            finished: false,
            waker: None,
        }));

        let parked = state.clone();
        let sink = Writable::builder()
            .with_name("readable-stream")
            .with_high_water_mark(1)
            .with_write(move |_, chunk, cb| {
                {
                    let mut st = parked.borrow_mut();
                    st.chunk = Some(chunk);
                    st.ack = Some(cb);
                }
                Bridge::wake(&parked);
            })
            .build();

        let done = state.clone();
        readable.pipe_with(&sink, move |outcome| {
            done.borrow_mut().outcome = Some(outcome);
            Bridge::wake(&done);
        })?;

        Ok(Self { state, sink })
    }
}

impl<T: 'static> Readable<T> {
    /// Consume this readable as a `futures::Stream`.
    pub fn into_stream(self) -> Result<ReadableStream<T>, ProtocolViolation> {
        ReadableStream::new(&self)
    }
}

impl<T: 'static> Stream for ReadableStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut st = self.state.borrow_mut();
        if let Some(chunk) = st.chunk.take() {
            let ack = st.ack.take();
            drop(st);
            // Releases the next write, which may park another chunk.
            if let Some(ack) = ack {
                ack.done();
            }
            return Poll::Ready(Some(Ok(chunk)));
        }

        if st.finished {
            return Poll::Ready(None);
        }
        match st.outcome.take() {
            Some(outcome) => {
                st.finished = true;
                Poll::Ready(outcome.err().map(Err))
            }
            None => {
                st.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T: 'static> Drop for ReadableStream<T> {
    fn drop(&mut self) {
        let finished = {
            let mut st = self.state.borrow_mut();
            st.ack = None;
            st.finished || st.outcome.is_some()
        };
        if !finished {
            self.sink.destroy(None);
        }
    }
}
