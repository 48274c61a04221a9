use std::sync::Arc;

use acme_procure::{
    create_csr, create_p256_key, AccountContext, AccountKey, ChallengeProvisioner as _,
    DirectoryUrl, MemoryProvisioner, OrderEngine, SignedTransport,
};
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};

const PRIMARY_NAME: &str = "example.org";

/// Answers the provider's validation request from the provisioner.
#[get("/.well-known/acme-challenge/{token}")]
async fn acme_challenge(
    provisioner: web::Data<MemoryProvisioner>,
    token: web::Path<String>,
) -> impl Responder {
    match provisioner.get(PRIMARY_NAME, &token).await {
        Ok(Some(key_authorization)) => HttpResponse::Ok()
            .content_type("application/octet-stream")
            .body(key_authorization),
        _ => HttpResponse::NotFound().finish(),
    }
}

#[actix_web::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let provisioner = web::Data::from(Arc::new(MemoryProvisioner::new()));

    // Create temporary Actix Web server for ACME challenge.
    let srv = HttpServer::new({
        let provisioner = provisioner.clone();
        move || {
            App::new()
                .app_data(provisioner.clone())
                .service(acme_challenge)
        }
    })
    .bind(("0.0.0.0", 80))?
    .shutdown_timeout(0)
    .run();

    let srv_handle = srv.handle();
    let srv_task = actix_web::rt::spawn(srv);

    // Use `DirectoryUrl::LetsEncrypt` for production uses.
    let transport = SignedTransport::new(DirectoryUrl::LetsEncryptStaging)?;

    // Your contact addresses, note the `mailto:`
    let contact = vec!["mailto:foo@bar.com".to_owned()];

    // Generate a private key and register an account with your ACME provider.
    // You should write the key to disk and register with it again on the next run, which returns
    // the existing account.
    log::info!("registering account");
    let key = AccountKey::generate();
    let account = AccountContext::register(&transport, key, Some(contact)).await?;
    log::info!("account URL: {}", account.id());

    // Create a private key for the certificate and a CSR for the domain.
    let signing_key = create_p256_key();
    let csr = create_csr(&signing_key, &[PRIMARY_NAME])?;

    // Order, validate, finalize and download in one go.
    let engine = OrderEngine::new(transport);
    let chain = engine
        .procure(&account, PRIMARY_NAME, &csr, provisioner.get_ref())
        .await?;

    println!("{chain}");

    // Stop temporary server for ACME challenge
    srv_handle.stop(true).await;
    srv_task.await??;

    Ok(())
}
