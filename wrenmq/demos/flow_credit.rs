use std::error::Error;
use std::time::Duration;

use tokio::{task, time};
use wrenmq::{AsyncClient, Event, OptionBuilder, Packet, QoS};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    // Start with a small amount of delivery credit. Incoming publishes beyond
    // the credit are parked inside the event loop and the socket stops being
    // read, so a slow consumer pushes back on the broker instead of buffering
    // without bound.
    let options = OptionBuilder::new_tcp("localhost", 1883)
        .client_id("test-1")
        .keep_alive(Duration::from_secs(5))
        .inbound_credit(5)
        .finalize();

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client
        .subscribe("hello/world", QoS::AtLeastOnce)
        .await
        .unwrap();

    task::spawn(async move {
        for i in 1..=20 {
            client
                .publish("hello/world", QoS::AtLeastOnce, false, vec![1; i])
                .await
                .unwrap();
        }

        // Consume slowly, topping the credit back up one delivery at a time.
        loop {
            time::sleep(Duration::from_millis(500)).await;
            client.grant_credit(1).await.unwrap();
        }
    });

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                println!("Delivered = {publish:?}");
            }
            Ok(event) => {
                println!("Event = {event:?}");
            }
            Err(error) => {
                println!("Error = {error:?}");
                return Ok(());
            }
        }
    }
}
