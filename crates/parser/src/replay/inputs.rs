use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::ReplayError;

/// Paths listed one per line. Blank lines and `#` comments are skipped.
pub fn read_path_list<R: BufRead>(reader: R) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        paths.push(PathBuf::from(entry));
    }
    Ok(paths)
}

/// Assemble the replay inputs: positionals, then the file list, then
/// `stdin` (only consulted when neither of the others was given).
/// Duplicates keep their first position; every path must be a regular file.
pub fn collect_inputs<R: BufRead>(
    positional: &[PathBuf],
    file_list: Option<&Path>,
    stdin: Option<R>,
) -> Result<Vec<PathBuf>, ReplayError> {
    let mut seen = HashSet::new();
    let mut collected = Vec::new();
    let mut add = |p: PathBuf| {
        if seen.insert(p.clone()) {
            collected.push(p);
        }
    };

    positional.iter().cloned().for_each(&mut add);

    if let Some(list) = file_list {
        let file = File::open(list).map_err(|e| ReplayError::io(list, e))?;
        read_path_list(BufReader::new(file))
            .map_err(|e| ReplayError::io(list, e))?
            .into_iter()
            .for_each(&mut add);
    }

    if positional.is_empty() && file_list.is_none() {
        if let Some(stdin) = stdin {
            read_path_list(stdin)
                .map_err(|e| ReplayError::io("<stdin>", e))?
                .into_iter()
                .for_each(&mut add);
        }
    }

    if collected.is_empty() {
        return Err(ReplayError::NoInputs);
    }
    if let Some(bad) = collected.iter().find(|p| !p.is_file()) {
        return Err(ReplayError::NotAFile(bad.clone()));
    }
    Ok(collected)
}
