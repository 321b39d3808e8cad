use argh::FromArgs;
use std::{path::PathBuf, time::Duration};

use probedeform::{
    deform::{DeformerConfig, ProbeMesh, WeightWorker},
    io::read_probes_csv,
};

#[derive(FromArgs)]
/// Deform an image grid with the probes of a CSV file and dump the vertices as JSON
struct Args {
    /// path to the probe CSV file
    #[argh(option)]
    probes: PathBuf,

    /// path to a JSON mesh configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// image width in pixels
    #[argh(option, default = "640.0")]
    width: f64,

    /// image height in pixels
    #[argh(option, default = "480.0")]
    height: f64,

    /// compute the weights on the background worker
    #[argh(switch)]
    background: bool,

    /// path to the output JSON file, stdout if not given
    #[argh(option)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => DeformerConfig::default(),
    };
    log::info!("mesh configuration: {config:?}");

    let mut session = ProbeMesh::new(config, args.width, args.height)?;

    let records = read_probes_csv(&args.probes)?;
    session.load_probes(&records)?;
    log::info!(
        "loaded {} probes from {}",
        records.len(),
        args.probes.display()
    );

    if args.background {
        let worker = WeightWorker::spawn();
        session.request_weights(&worker);
        if !session.wait_weights(&worker, Duration::from_secs(60))? {
            return Err("timed out waiting for the weights".into());
        }
    }

    let buffer = session.deform()?;

    let json = serde_json::json!({
        "version": buffer.version(),
        "positions": &buffer.positions()[..],
        "tex_coords": session.texture_coords(),
        "indices": session.indices(),
    });
    let text = serde_json::to_string_pretty(&json)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, text)?;
            log::info!("wrote {} vertices to {}", buffer.len(), path.display());
        }
        None => println!("{text}"),
    }

    Ok(())
}
