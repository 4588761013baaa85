//! CSV loaders for market data and behavior surfaces
//!
//! Market series are `date,value` files; each `<code>.csv` in a market
//! directory becomes the series of market object code `<code>`.

use std::error::Error;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use super::behavior::Surface;
use super::market::{MarketModel, TimeSeries};
use crate::terms::parse_datetime;

/// Load one `date,value` series
pub fn load_time_series<P: AsRef<Path>>(path: P) -> Result<TimeSeries, Box<dyn Error>> {
    load_time_series_from_reader(File::open(path)?)
}

pub fn load_time_series_from_reader<R: Read>(reader: R) -> Result<TimeSeries, Box<dyn Error>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut series = TimeSeries::new();

    for result in csv_reader.records() {
        let record = result?;
        let time = parse_datetime(&record[0]).ok_or_else(|| format!("invalid date `{}`", &record[0]))?;
        let value: f64 = record[1].trim().parse()?;
        series.insert(time, value);
    }

    Ok(series)
}

/// Load every `*.csv` in `dir` as a market series keyed by file stem
pub fn load_market_directory<P: AsRef<Path>>(dir: P) -> Result<MarketModel, Box<dyn Error>> {
    let mut market = MarketModel::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(code) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let series = load_time_series(&path)?;
        log::debug!("loaded market series {} ({} points)", code, series.len());
        market.insert(code, series);
    }

    Ok(market)
}

/// Load a surface whose header row holds the column margin and whose first
/// column holds the row margin
pub fn load_surface<R: Read>(reader: R) -> Result<Surface, Box<dyn Error>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let columns = csv_reader
        .headers()?
        .iter()
        .skip(1)
        .map(|h| h.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    let mut values = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        rows.push(record[0].trim().parse::<f64>()?);
        values.push(
            record
                .iter()
                .skip(1)
                .map(|v| v.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()?,
        );
    }

    Ok(Surface::new(rows, columns, values)?)
}
