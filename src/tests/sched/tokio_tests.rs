//! Streams driven by the tokio scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use tokio::task::LocalSet;

use crate::sched::TokioScheduler;
use crate::stream::{Readable, Transform, Writable};

#[tokio::test]
async fn pipeline_completes_on_local_set() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let sched = TokioScheduler::new();
            let source = Readable::from_iter(&sched, 1..=5u32);
            let double = Transform::<u32, u32>::builder(&sched, |_, n: u32, cb| cb.chunk(n * 2)).build();

            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink_seen = seen.clone();
            let sink = Writable::builder()
                .with_write(move |_, n: u32, cb| {
                    sink_seen.borrow_mut().push(n);
                    cb.done()
                })
                .build();

            let (tx, rx) = oneshot::channel();
            source.pipe(&double).unwrap();
            double
                .pipe_with(&sink, move |outcome| {
                    let _ = tx.send(outcome.is_ok());
                })
                .unwrap();

            assert!(rx.await.unwrap());
            assert_eq!(*seen.borrow(), vec![2, 4, 6, 8, 10]);
        })
        .await;
}

#[tokio::test]
async fn first_pull_waits_for_the_runtime() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let sched = TokioScheduler::new();
            let source = Readable::from_iter(&sched, vec!["x".to_string()]);
            assert_eq!(source.buffered_len(), 0);

            for _ in 0..16 {
                if source.is_ended() {
                    break;
                }
                tokio::task::yield_now().await;
            }
            assert_eq!(source.buffered_len(), 1);
            assert!(source.is_ended());
        })
        .await;
}
