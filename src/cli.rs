use crate::resolve::RawArgs;
use clap::Parser;
use log::info;
use std::path::PathBuf;

/// This plugin applies the Difference of Gaussians algorithm to an input collection.
#[derive(Parser, Debug, Clone)]
#[command(name = "dog-filter", version, about, long_about = None)]
pub struct Cli {
    /// Operation to perform: DoGSingleSigmas or DoGVaryingSigmas.
    #[arg(long = "opName")]
    op_name: Option<String>,

    /// The collection to be processed by this plugin.
    #[arg(long = "inpDIr")]
    inp_dir: Option<PathBuf>,

    /// The standard deviation of the first Gaussian filter.
    #[arg(long)]
    sigma1: Option<String>,

    /// The standard deviation of the second Gaussian filter.
    #[arg(long)]
    sigma2: Option<String>,

    /// The standard deviations of the first Gaussian filter (x,y).
    #[arg(long)]
    sigmas1: Option<String>,

    /// The standard deviations of the second Gaussian filter (x,y).
    #[arg(long)]
    sigmas2: Option<String>,

    /// Output collection.
    #[arg(long = "outDir")]
    out_dir: PathBuf,

    /// Optional path to a TOML file with filter parameters.
    ///
    /// Values given as flags take precedence over the file.
    #[arg(long)]
    params: Option<PathBuf>,
}

impl Cli {
    pub fn params(&self) -> Option<&PathBuf> {
        self.params.as_ref()
    }

    pub fn raw_args(&self) -> RawArgs {
        RawArgs {
            op_name: self.op_name.clone(),
            inp_dir: self.inp_dir.clone(),
            sigma1: self.sigma1.clone(),
            sigma2: self.sigma2.clone(),
            sigmas1: self.sigmas1.clone(),
            sigmas2: self.sigmas2.clone(),
            out_dir: self.out_dir.clone(),
        }
    }

    pub fn log_arguments(&self) {
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "None".to_string());

        info!("opName = {}", show(&self.op_name));
        match &self.inp_dir {
            Some(dir) => info!("inpDIr = {}", dir.display()),
            None => info!("inpDIr = None"),
        }
        info!("sigma1 = {}", show(&self.sigma1));
        info!("sigma2 = {}", show(&self.sigma2));
        info!("sigmas1 = {}", show(&self.sigmas1));
        info!("sigmas2 = {}", show(&self.sigmas2));
        info!("outDir = {}", self.out_dir.display());
    }
}
