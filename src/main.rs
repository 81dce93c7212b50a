use newsletter_outbox::config::get_configuration;
use newsletter_outbox::startup::{Application, StartupError};
use newsletter_outbox::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let subscriber = get_subscriber(
        String::from("newsletter_outbox"),
        String::from("info"),
        std::io::stdout,
    );

    init_subscriber(subscriber);

    let config = get_configuration()?;
    let application = Application::build(config).await?;

    tracing::info!("Server listening on port {}", application.get_port());

    application.run_until_stopped().await?;

    Ok(())
}
