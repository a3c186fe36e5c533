//! Tests for the futures::Stream bridge.

use std::cell::Cell;
use std::rc::Rc;

use futures::StreamExt;
use tokio::task::LocalSet;

use crate::io::ReadableStream;
use crate::sched::TokioScheduler;
use crate::stream::Readable;

#[tokio::test]
async fn stream_yields_chunks_in_order() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let sched = TokioScheduler::new();
            let rs = Readable::from_iter(&sched, 1..=50u32);
            let items: Vec<u32> = rs
                .into_stream()
                .unwrap()
                .map(|item| item.unwrap())
                .collect()
                .await;
            assert_eq!(items, (1..=50).collect::<Vec<_>>());
        })
        .await;
}

#[tokio::test]
async fn idle_consumer_holds_back_the_producer() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let sched = TokioScheduler::new();
            let pulls = Rc::new(Cell::new(0u32));
            let counter = pulls.clone();
            let rs = Readable::<u32>::builder(&sched)
                .with_high_water_mark(2)
                .with_read(move |_, cb| {
                    counter.set(counter.get() + 1);
                    cb.chunk(counter.get())
                })
                .build();

            let mut stream = ReadableStream::new(&rs).unwrap();
            assert_eq!(stream.next().await.unwrap().unwrap(), 1);
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            // One chunk parked in the bridge, one queued, two buffered.
            assert!(pulls.get() <= 5, "pulled {} chunks", pulls.get());

            drop(stream);
            assert!(rs.is_destroyed());
        })
        .await;
}

#[tokio::test]
async fn failure_is_yielded_once() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let sched = TokioScheduler::new();
            let rs = Readable::<u32>::builder(&sched)
                .with_read(|_, cb| cb.fail("source failed"))
                .build();

            let mut stream = rs.into_stream().unwrap();
            let first = stream.next().await.unwrap();
            assert!(first.is_err());
            assert!(stream.next().await.is_none());
        })
        .await;
}
