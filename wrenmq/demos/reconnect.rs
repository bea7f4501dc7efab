use std::error::Error;
use std::time::Duration;

use tokio::task;
use wrenmq::{AsyncClient, OptionBuilder, QoS, ReconnectOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let reconnect = ReconnectOptions::default()
        .enabled(true)
        .min_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(30));

    let options = OptionBuilder::new_tcp("localhost", 1883)
        .client_id("test-1")
        .keep_alive(Duration::from_secs(5))
        .clean_start(false)
        .reconnect(reconnect)
        .finalize();

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client
        .subscribe("hello/world", QoS::AtLeastOnce)
        .await
        .unwrap();

    // Watch the connection lifecycle from a separate task.
    let updates = eventloop.status_updates();
    task::spawn(async move {
        while let Ok(update) = updates.recv_async().await {
            println!("Status = {update:?}");
        }
    });

    // With reconnects enabled, poll() keeps returning events across broker
    // restarts. Kill and restart the broker to watch the backoff in action.
    loop {
        match eventloop.poll().await {
            Ok(event) => println!("Event = {event:?}"),
            Err(error) => {
                println!("Error = {error:?}");
                return Ok(());
            }
        }
    }
}
