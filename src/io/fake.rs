//! Fake dataset CSV: `id,model_id,<filters...>`.

use std::path::Path;

use crate::domain::{FakeDataset, FakeObservation};
use crate::error::AppError;
use crate::io::table::{create_csv, finish, fmt_f64, open_csv, parse_f64, parse_usize, read_records, write_row};

pub fn write_fake(path: &Path, dataset: &FakeDataset) -> Result<(), AppError> {
    let what = "fake dataset";
    let mut w = create_csv(path, what)?;
    let header: Vec<&str> = ["id", "model_id"]
        .into_iter()
        .chain(dataset.filters.iter().map(String::as_str))
        .collect();
    write_row(&mut w, header, what)?;
    for obs in &dataset.observations {
        let mut cells = vec![obs.id.clone(), obs.model_id.to_string()];
        cells.extend(obs.mags.iter().copied().map(fmt_f64));
        write_row(&mut w, cells, what)?;
    }
    finish(w, what)?;
    log::info!("wrote {} fake observations to {}", dataset.len(), path.display());
    Ok(())
}

/// Read a fake dataset (or one chunk of it).
pub fn read_fake(path: &Path) -> Result<FakeDataset, AppError> {
    let (mut reader, header) = open_csv(path, "fake dataset")?;
    let c_id = header.require(&["id", "obs_id"], path)?;
    let c_model = header.require(&["model_id"], path)?;
    let filter_cols: Vec<usize> = (0..header.names.len())
        .filter(|&i| i != c_id && i != c_model)
        .collect();
    if filter_cols.is_empty() {
        return Err(AppError::config(format!(
            "Fake dataset '{}' has no filter columns.",
            path.display()
        )));
    }

    let mut observations = Vec::new();
    for (line, rec) in read_records(&mut reader, path)? {
        observations.push(FakeObservation {
            id: rec.get(c_id).unwrap_or("").to_string(),
            model_id: parse_usize(&rec, c_model, line, path)?,
            mags: filter_cols
                .iter()
                .map(|&c| parse_f64(&rec, c, line, path))
                .collect::<Result<_, _>>()?,
        });
    }

    Ok(FakeDataset {
        filters: filter_cols.iter().map(|&i| header.names[i].clone()).collect(),
        observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_dataset_reloads_with_filter_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p_fake.csv");
        let data = FakeDataset {
            filters: vec!["F814W".into(), "F475W".into()],
            observations: vec![
                FakeObservation { id: "fake-0".into(), model_id: 4, mags: vec![19.5, 20.25] },
                FakeObservation { id: "fake-3".into(), model_id: 1, mags: vec![18.0, 18.5] },
            ],
        };
        write_fake(&path, &data).unwrap();
        assert_eq!(read_fake(&path).unwrap(), data);
    }
}
