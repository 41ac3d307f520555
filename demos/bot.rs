use parley::{api::types::MessageParams, Bot};
use serde_json::Value;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let mut bot = match Bot::from_env() {
        Ok(bot) => bot,
        Err(err) => {
            println!("Create bot failed: {}", err);
            std::process::exit(1);
        }
    };

    bot.on(parley::EVENT_READY, |ready: &Value| {
        log::info!("Ready as {}", ready["user"]["username"]);
    });

    let api = bot.api().clone();
    bot.on("MESSAGE_CREATE", move |message: &Value| {
        if message["content"] != "!ping" {
            return;
        }

        let channel_id = message["channel_id"].as_str().unwrap_or_default().to_string();
        let api = api.clone();
        tokio::spawn(async move {
            if let Err(err) = api
                .send_message(&channel_id, &MessageParams::text("pong"))
                .await
            {
                log::warn!("Reply failed: {}", err);
            }
        });
    });

    bot.run().await;
}
