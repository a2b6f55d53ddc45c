/*!
# Saving draws to CSV

Writes draws of shape **chain × sample × parameter** to a CSV file for an external
plotting layer (trace plots, pair plots, interval ribbons). Enable via the `csv`
feature (on by default).
*/

use ndarray::{Array3, Axis};
use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::error::{Result, SamplerError};

/**
Saves MCMC draws as a CSV file.

The file has a header row `chain,sample,<names...>` followed by one row per draw
of each chain. When `names` is `None` the parameter columns are called
`dim_0`, `dim_1`, and so on.

# Examples

```rust
use putt_mcmc::io::save_csv;
use ndarray::arr3;

let data = arr3(&[[[2.2, -0.25], [2.3, -0.26]]]);
let path = std::env::temp_dir().join("putt_mcmc_doc.csv");
save_csv(&data, Some(&["alpha", "beta"][..]), &path).unwrap();
```
*/
pub fn save_csv<T, P>(data: &Array3<T>, names: Option<&[&str]>, path: P) -> Result<()>
where
    T: std::fmt::Display,
    P: AsRef<Path>,
{
    let n_dims = data.shape()[2];
    let mut header: Vec<String> = vec!["chain".to_string(), "sample".to_string()];
    match names {
        Some(names) if names.len() != n_dims => {
            return Err(SamplerError::DimensionMismatch {
                expected: n_dims,
                found: names.len(),
            })
        }
        Some(names) => header.extend(names.iter().map(|s| s.to_string())),
        None => header.extend((0..n_dims).map(|i| format!("dim_{i}"))),
    }

    let mut wtr = Writer::from_writer(File::create(path.as_ref())?);
    wtr.write_record(&header)?;

    for (chain_idx, chain) in data.axis_iter(Axis(0)).enumerate() {
        for (sample_idx, sample) in chain.axis_iter(Axis(0)).enumerate() {
            let mut row = vec![chain_idx.to_string(), sample_idx.to_string()];
            row.extend(sample.iter().map(|v| v.to_string()));
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    log::info!(
        "Saved {} draws of {} chains to {}",
        data.shape()[1],
        data.shape()[0],
        path.as_ref().display()
    );
    Ok(())
}
