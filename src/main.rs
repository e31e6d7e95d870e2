use fanout_mq::SharedQueue;
use futures::StreamExt;

#[tokio::main]
async fn main() {
    let queue = SharedQueue::new();
    let fast = queue.subscribe().expect("failed to subscribe");
    let slow = queue.subscribe().expect("failed to subscribe");

    let sx = queue.clone();
    tokio::spawn(async move {
        for i in 0..100 {
            // Every manager receives every value, in order.
            sx.put(i).expect("failed to put value");
        }
        sx.close();
    });

    let fast = tokio::spawn(fast.into_stream().collect::<Vec<_>>());
    let slow = tokio::spawn(
        slow.into_stream()
            .then(|i| async move {
                tokio::task::yield_now().await;
                i
            })
            .collect::<Vec<_>>(),
    );

    let fast = fast.await.expect("fast manager panicked");
    let slow = slow.await.expect("slow manager panicked");
    assert_eq!(fast, slow);
    assert_eq!(fast, (0..100).collect::<Vec<_>>());
    assert!(queue.is_empty());
}
