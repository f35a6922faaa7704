use eni_ipam::commands::run_cni;
use eni_ipam::error::{Error, CODE_PLUGIN_SPECIFIC};
use eni_ipam::types::{ErrorResult, CURRENT_VERSION};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    // stdout carries the CNI result, logs go to stderr
    let filter = EnvFilter::try_from_env("ENI_IPAM_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);

    // Run the CNI plugin
    if let Err(err) = run_cni() {
        error!("CNI plugin error: {:#}", err);

        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<Error>())
            .map(Error::cni_code)
            .unwrap_or(CODE_PLUGIN_SPECIFIC);

        // Output error in CNI format
        let result = ErrorResult {
            cni_version: CURRENT_VERSION.to_string(),
            code,
            msg: err.to_string(),
            details: format!("{:#}", err),
        };
        match serde_json::to_string(&result) {
            Ok(json) => println!("{}", json),
            Err(_) => eprintln!("{:#}", err),
        }
        std::process::exit(1);
    }
}
