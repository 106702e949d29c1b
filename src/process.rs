use crate::config::Settings;
use crate::engine::Engine;
use crate::engine::EngineError;
use crate::error::ProcessError;
use crate::imageio;
use crate::metadata::ImageMetadata;
use crate::resolve::Invocation;
use crate::resolve::Operation;
use log::debug;
use log::info;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

/// Where one result was written and what it was written with.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub path: PathBuf,
    pub metadata: ImageMetadata,
}

/// Filter every file of the work list in order.
///
/// Stops at the first failure; results saved before it stay on disk.
pub fn process_all(
    engine: &dyn Engine,
    invocation: &Invocation,
    settings: &Settings,
) -> Result<Vec<OutputRecord>, ProcessError> {
    let mut outputs = Vec::with_capacity(invocation.work_list.len());
    let mut claimed = HashSet::new();
    for path in &invocation.work_list {
        outputs.push(process_file(
            engine,
            &invocation.operation,
            path,
            &invocation.out_dir,
            &settings.default_extension,
            &mut claimed,
        )?);
    }
    Ok(outputs)
}

/// Filter one file. `claimed` holds the outputs already written in this
/// run; a file whose output is among them fails before it is filtered.
pub fn process_file(
    engine: &dyn Engine,
    operation: &Operation,
    path: &Path,
    out_dir: &Path,
    fallback_extension: &str,
    claimed: &mut HashSet<PathBuf>,
) -> Result<OutputRecord, ProcessError> {
    info!("Processing image: {}", path.display());
    let record = imageio::read_image(path).map_err(|source| ProcessError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    let out_path = imageio::output_path(
        out_dir,
        &record.file_name,
        record.plane.pixel_type(),
        fallback_extension,
    );
    if !claimed.insert(out_path.clone()) {
        return Err(ProcessError::OutputClash {
            path: path.to_path_buf(),
            output: out_path,
        });
    }

    let convert_failed = |source: EngineError| ProcessError::Convert {
        path: path.to_path_buf(),
        source,
    };
    let input = engine.to_array(&record.plane).map_err(convert_failed)?;
    let pixel_type = input.pixel_type();

    let bounds = operation.bind(pixel_type);
    debug!("{} bound to {bounds:?} for {pixel_type} samples", operation.name());

    info!("Running op...");
    let output = engine
        .dog(&input, &bounds)
        .map_err(|source| ProcessError::Invoke {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Completed op!");

    let plane = engine.from_array(output, pixel_type).map_err(convert_failed)?;

    info!("Saving...");
    let metadata = record.metadata.for_output(&plane);
    imageio::write_plane(&out_path, &plane, &metadata).map_err(|source| ProcessError::Save {
        path: out_path.clone(),
        source,
    })?;

    Ok(OutputRecord {
        path: out_path,
        metadata,
    })
}
