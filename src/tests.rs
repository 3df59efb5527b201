use crate::error::FlowError;
use crate::store::{StoredVariable, Values, VariableStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Writes a (time, lat, lon) file with an unlimited time axis.
fn write_grid_file(
    path: &Path,
    time_units: &str,
    times: &[f64],
    lat: &[f64],
    lon: &[f64],
    name: &str,
    values: &[f64],
) {
    write_grid_file_with(path, time_units, times, lat, lon, name, values, &[], &[]);
}

#[allow(clippy::too_many_arguments)]
fn write_grid_file_with(
    path: &Path,
    time_units: &str,
    times: &[f64],
    lat: &[f64],
    lon: &[f64],
    name: &str,
    values: &[f64],
    text_attrs: &[(&str, &str)],
    number_attrs: &[(&str, f64)],
) {
    let mut file = netcdf::create(path).unwrap();
    file.add_unlimited_dimension("time").unwrap();
    file.add_dimension("lat", lat.len()).unwrap();
    file.add_dimension("lon", lon.len()).unwrap();

    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_values(times, [0..times.len()]).unwrap();
    time.put_attribute("units", time_units).unwrap();
    time.put_attribute("calendar", "proleptic_gregorian").unwrap();

    let mut var = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    var.put_values(lat, ..).unwrap();
    var.put_attribute("units", "degrees_north").unwrap();
    let mut var = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    var.put_values(lon, ..).unwrap();
    var.put_attribute("units", "degrees_east").unwrap();

    let mut var = file.add_variable::<f64>(name, &["time", "lat", "lon"]).unwrap();
    var.put_values(values, [0..times.len(), 0..lat.len(), 0..lon.len()])
        .unwrap();
    var.put_attribute("missing_value", -9999.0).unwrap();
    for (key, value) in text_attrs {
        var.put_attribute(key, *value).unwrap();
    }
    for (key, value) in number_attrs {
        var.put_attribute(key, *value).unwrap();
    }
}

fn read_values(path: &Path, name: &str) -> Vec<f64> {
    let file = netcdf::open(path).unwrap();
    let var = file.variable(name).unwrap();
    var.get_values::<f64, _>(..).unwrap()
}

fn save_store(dir: &Path, variables: Vec<(&str, StoredVariable)>) -> PathBuf {
    let mut store = VariableStore::new();
    for (name, variable) in variables {
        store.insert(name, variable);
    }
    let path = dir.join("store.json");
    store.save(&path).unwrap();
    path
}

#[cfg(test)]
mod extract_tests {
    use super::*;
    use crate::extract::open_dataset;

    fn write_era5(path: &Path, times: &[f64], values: &[f64]) {
        write_grid_file_with(
            path,
            "hours since 2017-01-01 00:00:00",
            times,
            &[8.0, 8.25],
            &[30.0],
            "t2m",
            values,
            &[("long_name", "2 metre temperature"), ("units", "K")],
            &[("scale_factor", 0.5), ("add_offset", 250.0)],
        );
    }

    #[test]
    fn test_open_dataset_concatenates_record_variables() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.nc");
        let b = dir.path().join("b.nc");
        write_era5(&a, &[0.0, 3.0], &[100.0, 102.0, 104.0, -9999.0]);
        write_era5(&b, &[6.0], &[106.0, 108.0]);

        let store = open_dataset(&[&a, &b]).unwrap();
        let t2m = store.get("2 metre temperature").unwrap();
        assert_eq!(t2m.shape, vec![3, 2, 1]);
        assert_eq!(t2m.units, "K");
        assert_eq!(t2m.standard_name.as_deref(), Some("NA"));
        assert_eq!(t2m.missing_value, Some(-9999.0));
        let values = t2m.as_numeric("t2m").unwrap();
        assert_eq!(&values[..3], &[300.0, 301.0, 302.0]);
        assert!(values[3].is_nan());
        assert_eq!(&values[4..], &[303.0, 304.0]);

        // record coordinate follows the files, fixed coordinates come from the first
        assert_eq!(store.get("time").unwrap().as_numeric("time").unwrap(), &[0.0, 3.0, 6.0]);
        assert_eq!(store.get("lat").unwrap().shape, vec![2]);
        assert!(store.get("t2m").is_err());
    }

    #[test]
    fn test_open_dataset_rejects_mismatched_grids() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.nc");
        let b = dir.path().join("b.nc");
        write_era5(&a, &[0.0], &[100.0, 101.0]);
        write_grid_file(
            &b,
            "hours since 2017-01-01 00:00:00",
            &[3.0],
            &[8.0, 8.25, 8.5],
            &[30.0],
            "t2m",
            &[1.0, 2.0, 3.0],
        );
        assert!(matches!(
            open_dataset(&[&a, &b]),
            Err(FlowError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_store_round_trip_keeps_nan() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.nc");
        write_era5(&a, &[0.0], &[-9999.0, 110.0]);
        let out = dir.path().join("store.json");
        crate::extract::open_netcdf(&[&a], &out).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("null"));
        let store = VariableStore::load(&out).unwrap();
        let values = store.get("2 metre temperature").unwrap().as_numeric("t2m").unwrap();
        assert!(values[0].is_nan());
        assert_eq!(values[1], 305.0);
    }

    #[test]
    fn test_summary_uses_store_keys() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.nc");
        write_era5(&a, &[0.0], &[100.0, 101.0]);
        let summary = crate::info::summarize(&a, Some("t2m"), true).unwrap();
        assert_eq!(summary.variables.len(), 1);
        assert_eq!(summary.variables[0].key, "2 metre temperature");
        assert_eq!(summary.variables[0].shape, vec![1, 2, 1]);
        assert!(summary.variables[0].record);
        assert!(summary.variables[0].attributes.contains_key("scale_factor"));

        // the summary key is the key open-netcdf stores under
        let store = open_dataset(&[&a]).unwrap();
        assert!(store.contains(&summary.variables[0].key));
    }
}

#[cfg(test)]
mod store_step_tests {
    use super::*;
    use crate::derive::*;
    use crate::variables::*;

    #[test]
    fn test_select_var_writes_warnings() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![("2 metre temperature", StoredVariable::numeric(vec![280.0], vec![1], "K"))],
        );
        let varlist = dir.path().join("vars.txt");
        fs::write(&varlist, "2 metre temperature\n\n  Total precipitation \n").unwrap();
        let output = dir.path().join("out.json");
        let warnings = dir.path().join("warnings.txt");

        select_var(&store, &varlist, &output, &warnings).unwrap();
        assert_eq!(fs::read_to_string(&warnings).unwrap(), "Total precipitation\n");
        assert_eq!(VariableStore::load(&output).unwrap().len(), 1);
    }

    #[test]
    fn test_complete_check_reports_all_missing() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![("a", StoredVariable::numeric(vec![1.0], vec![1], "NA"))],
        );
        let varlist = dir.path().join("vars.txt");
        fs::write(&varlist, "a\nb\nc\n").unwrap();
        let output = dir.path().join("out.json");

        let err = complete_check(&store, &varlist, &output).unwrap_err();
        assert_eq!(err.to_string(), "variables are missing: b, c");
        assert!(!output.exists());
    }

    #[test]
    fn test_adjust_units_converts_and_notes() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![
                ("2 metre temperature", StoredVariable::numeric(vec![273.15, 300.0], vec![2], "K")),
                ("Surface pressure", StoredVariable::numeric(vec![101325.0], vec![1], "Pa")),
            ],
        );
        let varlist = dir.path().join("vars.txt");
        let unitlist = dir.path().join("units.txt");
        fs::write(&varlist, "2 metre temperature\nSurface pressure\n").unwrap();
        fs::write(&unitlist, "C\nPa\n").unwrap();
        let output = dir.path().join("out.json");

        adjust_units(&store, &varlist, &unitlist, &output).unwrap();
        let store = VariableStore::load(&output).unwrap();
        let t = store.get("2 metre temperature").unwrap();
        assert_eq!(t.units, "C");
        assert_eq!(t.notes.as_deref(), Some(CONVERTED_NOTE));
        let values = t.as_numeric("t").unwrap();
        assert!(values[0].abs() < 1e-9);
        assert!((values[1] - 26.85).abs() < 1e-9);
        // already in the desired unit: untouched
        assert_eq!(store.get("Surface pressure").unwrap().notes, None);
    }

    #[test]
    fn test_adjust_units_unknown_pair() {
        let mut store = VariableStore::new();
        store.insert("x", StoredVariable::numeric(vec![1.0], vec![1], "furlong"));
        let err = convert_units(&mut store, &["x".to_string()], &["m".to_string()]).unwrap_err();
        assert!(matches!(err, FlowError::UnsupportedConversion { .. }));
    }

    #[test]
    fn test_amount_to_rate() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![("Total precipitation", StoredVariable::numeric(vec![0.003, 0.0], vec![2], "m"))],
        );
        let output = dir.path().join("out.json");
        amount_to_rate(&store, &output, "Total precipitation", 3.0).unwrap();

        let store = VariableStore::load(&output).unwrap();
        let rate = store.get(PRECIPITATION_RATE).unwrap();
        assert_eq!(rate.units, "mm/hr");
        assert_eq!(rate.notes.as_deref(), Some("converted from amount, Total precipitation"));
        let values = rate.as_numeric(PRECIPITATION_RATE).unwrap();
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert_eq!(values[1], 0.0);
    }

    #[test]
    fn test_calculate_rh() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![
                ("2 metre dewpoint temperature", StoredVariable::numeric(vec![20.0, 10.0], vec![2], "C")),
                ("2 metre temperature", StoredVariable::numeric(vec![20.0, 20.0], vec![2], "C")),
            ],
        );
        let output = dir.path().join("out.json");
        calculate_rh(&store, &output, "2 metre dewpoint temperature", "2 metre temperature").unwrap();

        let store = VariableStore::load(&output).unwrap();
        let rh = store.get(RELATIVE_HUMIDITY).unwrap();
        assert_eq!(rh.units, "NA");
        let values = rh.as_numeric(RELATIVE_HUMIDITY).unwrap();
        assert!((values[0] - 100.0).abs() < 1e-9);
        assert!(values[1] > 50.0 && values[1] < 55.0);
    }

    #[test]
    fn test_calculate_rh_requires_both_inputs() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![("2 metre temperature", StoredVariable::numeric(vec![20.0], vec![1], "C"))],
        );
        let output = dir.path().join("out.json");
        let err = calculate_rh(&store, &output, "2 metre dewpoint temperature", "2 metre temperature")
            .unwrap_err();
        assert!(matches!(err, FlowError::VariableNotFound(_)));
    }

    #[test]
    fn test_calculate_wind() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![
                ("10 metre U wind component", StoredVariable::numeric(vec![3.0, 0.0], vec![2], "m s**-1")),
                ("10 metre V wind component", StoredVariable::numeric(vec![4.0, -2.0], vec![2], "m s**-1")),
            ],
        );
        let output = dir.path().join("out.json");
        calculate_wind(&store, &output, "10 metre U wind component", "10 metre V wind component").unwrap();

        let store = VariableStore::load(&output).unwrap();
        let speed = store.get(WIND_SPEED).unwrap();
        assert_eq!(speed.units, "m s**-1");
        assert_eq!(speed.as_numeric(WIND_SPEED).unwrap(), &[5.0, 2.0]);
        let height = store.get(WIND_HEIGHT).unwrap();
        assert_eq!(height.units, "m");
        assert_eq!(height.as_numeric(WIND_HEIGHT).unwrap(), &[10.0]);
    }

    #[test]
    fn test_adjust_time_decodes_dates() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![(
                "time",
                StoredVariable::numeric(vec![0.0, 36.0], vec![2], "hours since 2017-01-01 00:00:00"),
            )],
        );
        let output = dir.path().join("out.json");
        adjust_time(&store, "gregorian", &output, "time").unwrap();

        let store = VariableStore::load(&output).unwrap();
        let dates = store.get(DATES).unwrap();
        assert_eq!(dates.calendar.as_deref(), Some("gregorian"));
        assert_eq!(dates.units, "NA");
        assert_eq!(
            dates.values,
            Values::Text(vec![
                "2017-01-01T00:00:00".to_string(),
                "2017-01-02T12:00:00".to_string()
            ])
        );
    }

    #[test]
    fn test_adjust_format_writes_float32() {
        let dir = tempdir().unwrap();
        let store = save_store(
            dir.path(),
            vec![
                ("a", StoredVariable::numeric(vec![1.5, -2.0], vec![2], "NA")),
                ("b", StoredVariable::numeric(vec![3.0], vec![1], "NA")),
            ],
        );
        let out_a = dir.path().join("a.bin");
        let out_b = dir.path().join("b.bin");
        adjust_format(&store, &["a".to_string(), "b".to_string()], &[&out_a, &out_b]).unwrap();

        let bytes = fs::read(&out_a).unwrap();
        assert_eq!(bytes.len(), 8);
        let first = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let second = f32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!((first, second), (1.5, -2.0));
        assert_eq!(fs::read(&out_b).unwrap().len(), 4);

        assert!(adjust_format(&store, &["a".to_string()], &[&out_a, &out_b]).is_err());
    }
}

#[cfg(test)]
mod flood_tests {
    use super::*;
    use crate::dataset::BoundingBox;
    use crate::flood::{FloodOptions, Provenance, run_flood_index};

    const LAT: [f64; 2] = [1.0, 2.0];
    const LON: [f64; 3] = [10.0, 11.0, 12.0];

    fn write_thresholds(path: &Path) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("lat", LAT.len()).unwrap();
        file.add_dimension("lon", LON.len()).unwrap();
        let mut var = file.add_variable::<f64>("lat", &["lat"]).unwrap();
        var.put_values(&LAT, ..).unwrap();
        let mut var = file.add_variable::<f64>("lon", &["lon"]).unwrap();
        var.put_values(&LON, ..).unwrap();
        for (name, value) in [("Q_2", 10.0), ("Q_5", 20.0), ("Q_20", 30.0)] {
            let mut var = file.add_variable::<f64>(name, &["lat", "lon"]).unwrap();
            var.put_values(&[value; 6], ..).unwrap();
        }
    }

    fn options(output_dir: &Path, years: Vec<i32>, figures: bool) -> FloodOptions {
        FloodOptions {
            bbox: BoundingBox::new(10.0, 12.0, 1.0, 2.0).unwrap(),
            years,
            figures,
            output_dir: output_dir.to_path_buf(),
            provenance: Provenance {
                creator_name: Some("Flood Team".to_string()),
                creator_email: None,
                institution: None,
            },
        }
    }

    #[test]
    fn test_single_file_selects_years() {
        let dir = tempdir().unwrap();
        let thresholds = dir.path().join("thresholds.nc");
        write_thresholds(&thresholds);
        let data = dir.path().join("glofas.nc");
        // 2017-12-31, 2018-01-01, 2018-01-02
        let mut values = vec![35.0; 6];
        values.extend([5.0, 10.0, 15.0, 20.0, 25.0, 30.0]);
        values.extend([-9999.0, 0.0, 0.0, 0.0, 0.0, 31.0]);
        write_grid_file(
            &data,
            "days since 2017-12-31 00:00:00",
            &[0.0, 1.0, 2.0],
            &LAT,
            &LON,
            "dis24",
            &values,
        );

        let out = dir.path().join("out");
        let outputs = run_flood_index(&data, &thresholds, &options(&out, vec![2018], true)).unwrap();
        assert_eq!(outputs, vec![out.join("results").join("GloFAS_FloodIndex_all.nc")]);

        let index = read_values(&outputs[0], "flood");
        assert_eq!(index.len(), 12);
        assert_eq!(&index[..6], &[0.0, 1.0, 1.0, 2.0, 2.0, 3.0]);
        assert!(index[6].is_nan());
        assert_eq!(index[11], 3.0);
        assert_eq!(read_values(&outputs[0], "time"), vec![1.0, 2.0]);

        let file = netcdf::open(&outputs[0]).unwrap();
        let creator = file.attribute("creator_name").unwrap().value().unwrap();
        assert!(matches!(creator, netcdf::AttributeValue::Str(ref s) if s == "Flood Team"));
        assert!(file.attribute("institution").is_none());

        assert!(out.join("figures").join("flooding_t2018-01-01.png").exists());
        assert!(out.join("figures").join("flooding_t2018-01-02.png").exists());
        assert!(!out.join("figures").join("flooding_t2017-12-31.png").exists());
        assert!(out.join("results").join("Flooding_index.gif").exists());
    }

    #[test]
    fn test_year_directories_are_concatenated() {
        let dir = tempdir().unwrap();
        let thresholds = dir.path().join("thresholds.nc");
        write_thresholds(&thresholds);
        let year_dir = dir.path().join("data").join("2018");
        fs::create_dir_all(&year_dir).unwrap();
        write_grid_file(
            &year_dir.join("a.nc"),
            "days since 2018-01-01",
            &[0.0, 1.0],
            &LAT,
            &LON,
            "dis24",
            &[12.0; 12],
        );
        write_grid_file(
            &year_dir.join("b.nc"),
            "days since 2018-01-03",
            &[0.0],
            &LAT,
            &LON,
            "dis24",
            &[22.0; 6],
        );

        let out = dir.path().join("out");
        let data = dir.path().join("data");
        let outputs = run_flood_index(&data, &thresholds, &options(&out, vec![2018], false)).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].ends_with("GloFAS_FloodIndex_2018.nc"));
        assert_eq!(read_values(&outputs[0], "time"), vec![0.0, 1.0, 2.0]);
        let index = read_values(&outputs[0], "flood");
        assert_eq!(index[0], 1.0);
        assert_eq!(index[17], 2.0);
        assert!(!out.join("figures").exists());
    }

    #[test]
    fn test_packed_discharge_is_unpacked() {
        let dir = tempdir().unwrap();
        let thresholds = dir.path().join("thresholds.nc");
        write_thresholds(&thresholds);
        let data = dir.path().join("packed.nc");
        write_grid_file_with(
            &data,
            "days since 2018-01-01",
            &[0.0],
            &LAT,
            &LON,
            "dis24",
            &[50.0, 50.0, 8.0, 70.0, -9999.0, 0.0],
            &[],
            &[("scale_factor", 0.5), ("add_offset", 0.0)],
        );

        let out = dir.path().join("out");
        let outputs = run_flood_index(&data, &thresholds, &options(&out, vec![2018], false)).unwrap();
        let index = read_values(&outputs[0], "flood");
        assert_eq!(&index[..4], &[2.0, 2.0, 0.0, 3.0]);
        assert!(index[4].is_nan());
        assert_eq!(index[5], 0.0);
    }

    #[test]
    fn test_empty_year_directory() {
        let dir = tempdir().unwrap();
        let thresholds = dir.path().join("thresholds.nc");
        write_thresholds(&thresholds);
        fs::create_dir_all(dir.path().join("data").join("2019")).unwrap();
        let err = run_flood_index(
            dir.path().join("data"),
            &thresholds,
            &options(dir.path(), vec![2019], false),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::NoDatasets(_)));
    }
}

#[cfg(test)]
mod weather_tests {
    use super::*;
    use crate::dataset::BoundingBox;
    use crate::weather::{DAILY_YEARS, MISSING_VALUE, WgenRequest, fldas_to_wgen, wgen_to_fldas};

    /// Writes a one-step FLDAS file on (time, Y, X) with a global missing flag.
    fn write_fldas_file(path: &Path, date: &str, x: &[f64], y: &[f64], variables: &[(&str, Vec<f64>)]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = netcdf::create(path).unwrap();
        file.add_unlimited_dimension("time").unwrap();
        file.add_dimension("Y", y.len()).unwrap();
        file.add_dimension("X", x.len()).unwrap();
        let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
        time.put_values(&[0.0], [0..1]).unwrap();
        time.put_attribute("units", format!("days since {}", date)).unwrap();
        let mut var = file.add_variable::<f64>("Y", &["Y"]).unwrap();
        var.put_values(y, ..).unwrap();
        let mut var = file.add_variable::<f64>("X", &["X"]).unwrap();
        var.put_values(x, ..).unwrap();
        for (name, values) in variables {
            let mut var = file.add_variable::<f64>(name, &["time", "Y", "X"]).unwrap();
            var.put_values(values, [0..1, 0..y.len(), 0..x.len()]).unwrap();
        }
        file.add_attribute("missing_value", MISSING_VALUE).unwrap();
    }

    #[test]
    fn test_fldas_to_wgen_end_to_end() {
        let dir = tempdir().unwrap();
        let monthly = dir.path().join("monthly");
        let daily = dir.path().join("daily");

        // only X 24.1 / 24.2 and Y -4.9 lie strictly inside the box
        let x = [24.0, 24.1, 24.2, 24.3];
        let y = [-5.0, -4.9, -4.8];
        let grid = |edge: f64, a: f64, b: f64| {
            let mut values = vec![edge; 12];
            values[5] = a;
            values[6] = b;
            values
        };
        let months: [(&str, &str, Vec<f64>); 5] = [
            ("2005", "2005-01-01", grid(1000.0, 1.0, 3.0)),
            ("2005", "2005-02-01", grid(1000.0, 2.0, MISSING_VALUE)),
            // outside the season
            ("2005", "2005-03-01", grid(1000.0, 100.0, 100.0)),
            ("2006", "2006-01-01", grid(0.0, 5.0, 5.0)),
            ("2006", "2006-02-01", grid(0.0, 7.0, 7.0)),
        ];
        for (period, date, values) in &months {
            let path = monthly.join(period).join(format!("FLDAS_{}.nc", date));
            write_fldas_file(&path, date, &x, &y, &[("Rainf_f_tavg", values.clone())]);
        }

        // daily cells: (24.0, -5.0) and (24.3, -5.0); 24.5 is outside
        let dx = [24.0, 24.3, 24.5];
        let dy = [-5.0];
        write_fldas_file(
            &daily.join("2005").join("01").join("d01.nc"),
            "2005-01-01",
            &dx,
            &dy,
            &[
                ("Tair_f_tavg", vec![283.15, 293.15, 0.0]),
                ("Wind_f_tavg", vec![2.0, 4.0, 0.0]),
                ("Rainf_f_tavg", vec![1e-5, 0.0, 0.0]),
            ],
        );
        write_fldas_file(
            &daily.join("2005").join("01").join("d02.nc"),
            "2005-01-02",
            &dx,
            &dy,
            &[
                ("Tair_f_tavg", vec![293.15, MISSING_VALUE, 0.0]),
                ("Wind_f_tavg", vec![4.0, 6.0, 0.0]),
                ("Rainf_f_tavg", vec![2e-5, 0.0, 0.0]),
            ],
        );
        write_fldas_file(
            &daily.join("2005").join("02").join("d01.nc"),
            "2005-02-01",
            &dx,
            &dy,
            &[
                ("Tair_f_tavg", vec![273.15, 278.15, 0.0]),
                ("Wind_f_tavg", vec![1.0, 1.0, 0.0]),
                ("Rainf_f_tavg", vec![0.0, 5e-5, 0.0]),
            ],
        );

        let request = WgenRequest {
            monthly_dir: monthly,
            daily_dir: daily,
            variable: "Rainf_f_tavg".to_string(),
            bbox: BoundingBox::new(24.0, 24.3, -5.0, -4.8).unwrap(),
            min_month: 1,
            max_month: 2,
            level: 0.5,
            available_years: DAILY_YEARS,
        };
        let output = dir.path().join("FLDAS_WGEN.csv");
        // 2005 averages 2 and 2006 averages 6; level 0.5 picks rank 1
        assert_eq!(fldas_to_wgen(&request, &output).unwrap(), 2005);

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "station id,lon,lat,year,month,min. temperature,max. temperature,cloud fraction,wind speed,precipitation,wet",
                "FLDAS_00001,24.0,-5.0,2005,1,10.0,20.0,0.5,3.0,2.6,2",
                "FLDAS_00002,24.3,-5.0,2005,1,20.0,20.0,0.5,5.0,0.0,0",
                "FLDAS_00003,24.0,-5.0,2005,2,0.0,0.0,0.5,1.0,0.0,0",
                "FLDAS_00004,24.3,-5.0,2005,2,5.0,5.0,0.5,1.0,4.33,1",
            ]
        );
    }

    #[test]
    fn test_fldas_to_wgen_level_picks_wetter_year() {
        let dir = tempdir().unwrap();
        let monthly = dir.path().join("monthly");
        let x = [24.0, 24.1, 24.2];
        let y = [-5.0, -4.9, -4.8];
        for (year, value) in [(2003, 4.0), (2004, 1.0), (2020, 9.0)] {
            for month in 1..=2 {
                let date = format!("{}-{:02}-01", year, month);
                let path = monthly.join(year.to_string()).join(format!("{}.nc", date));
                write_fldas_file(&path, &date, &x, &y, &[("Rainf_f_tavg", vec![value; 9])]);
            }
        }
        let request = WgenRequest {
            monthly_dir: monthly,
            daily_dir: dir.path().join("daily"),
            variable: "Rainf_f_tavg".to_string(),
            bbox: BoundingBox::new(24.0, 24.2, -5.0, -4.8).unwrap(),
            min_month: 1,
            max_month: 2,
            level: 1.0,
            available_years: DAILY_YEARS,
        };
        let means = crate::weather::climatology(&request).unwrap();
        let years: Vec<i32> = means.iter().map(|m| m.year).collect();
        assert_eq!(years, vec![2004, 2003, 2020]);
        // 2020 is the wettest but has no daily data, one rank down wins
        assert_eq!(
            crate::weather::find_year(&means, 1.0, &DAILY_YEARS).unwrap(),
            2003
        );
    }

    #[test]
    fn test_wgen_to_fldas_grids_stations() {
        let dir = tempdir().unwrap();
        let wgen_in = dir.path().join("stations.csv");
        fs::write(
            &wgen_in,
            "station id,lon,lat,year,month\n\
             FLDAS_00000,24.0,-5.0,2010,1\n\
             FLDAS_00001,24.2,-4.9,2010,1\n",
        )
        .unwrap();
        let wgen_out = dir.path().join("generated.csv");
        fs::write(
            &wgen_out,
            "id,year,month,day,tmin,tmax,wind,prcp\n\
             FLDAS_00000,2010,1,1,10.0,20.0,2.5,86.4\n\
             FLDAS_00001,2010,1,1,12.0,22.0,3.0,0.0\n\
             FLDAS_00000,2010,1,2,11.0,21.0,2.0,0.0\n",
        )
        .unwrap();
        let out = dir.path().join("fldas");

        let files = wgen_to_fldas(&wgen_out, &wgen_in, &out, "FLDAS_WGEN_").unwrap();
        assert_eq!(
            files,
            vec![
                out.join("2010").join("01").join("FLDAS_WGEN_20100101.001.nc"),
                out.join("2010").join("01").join("FLDAS_WGEN_20100102.001.nc"),
            ]
        );

        // 2 x 3 grid: station 0 in the first cell, station 1 in the last
        let temperature = read_values(&files[0], "Tair_f_tavg");
        assert_eq!(temperature.len(), 6);
        assert!((temperature[0] - 288.15).abs() < 1e-9);
        assert!((temperature[5] - 290.15).abs() < 1e-9);
        assert_eq!(temperature[1], MISSING_VALUE);

        let rain = read_values(&files[0], "Rainf_f_tavg");
        assert!((rain[0] - 86.4 * 997.0 / 86_400_000.0).abs() < 1e-12);
        assert_eq!(read_values(&files[0], "X").len(), 3);
        assert_eq!(read_values(&files[1], "Wind_f_tavg")[5], MISSING_VALUE);

        let file = netcdf::open(&files[0]).unwrap();
        let conventions = file.attribute("Conventions").unwrap().value().unwrap();
        assert!(matches!(conventions, netcdf::AttributeValue::Str(ref s) if s == "CF-1.4"));
    }

    #[test]
    fn test_wgen_to_fldas_unknown_station() {
        let dir = tempdir().unwrap();
        let wgen_in = dir.path().join("stations.csv");
        fs::write(&wgen_in, "station id,lon,lat\nFLDAS_00000,24.0,-5.0\n").unwrap();
        let wgen_out = dir.path().join("generated.csv");
        fs::write(
            &wgen_out,
            "id,year,month,day,tmin,tmax,wind,prcp\nFLDAS_00009,2010,1,1,10.0,20.0,2.5,0.0\n",
        )
        .unwrap();
        assert!(wgen_to_fldas(&wgen_out, &wgen_in, &dir.path().join("out"), "P").is_err());
    }
}

#[cfg(test)]
mod pihm_tests {
    use super::*;
    use crate::pihm::{pihm_to_cycles, project_name, run_pihm};
    use chrono::NaiveDate;

    const FORCING: &str = "\
Precip 1 2
0 0.002
1 0.0
Temp 1 2
0 20.0
1 25.0
RH 1 2
0 0.5
1 0.8
Wind 1 2
0 172800.0
1 86400.0
RN 1 2
0 15000000.0
1 20000000.0
";

    #[test]
    fn test_pihm_to_cycles_weather_file() {
        let dir = tempdir().unwrap();
        let forcing = dir.path().join("forcing.txt");
        let attributes = dir.path().join("att.txt");
        let cropland = dir.path().join("cropland.csv");
        let weather = dir.path().join("weather.txt");
        fs::write(&forcing, FORCING).unwrap();
        fs::write(&attributes, "5\t1\t1\t1\t1\t1\t1\t1\t1\t1\t1\n").unwrap();
        fs::write(&cropland, "SP_ID,Y_c,X_c,Zmax,Zmin\n5,8.5,30.1,120.0,100.0\n7,9.0,31.0,1.0,0.0\n").unwrap();

        pihm_to_cycles(
            &forcing,
            &attributes,
            &cropland,
            NaiveDate::from_ymd_opt(2017, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2017, 1, 2).unwrap(),
            &weather,
        )
        .unwrap();

        let content = fs::read_to_string(&weather).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "LATITUDE 8.50");
        assert_eq!(lines[1], "ALTITUDE 20.00");
        assert_eq!(lines[2], "SCREENING_HEIGHT 2");
        assert!(lines[3].starts_with("YEAR  DOY"));
        assert!(lines[4].starts_with("2017  001    2.00"));
        assert!(lines[4].ends_with("   2.00"));
        assert!(lines[5].starts_with("2017  002    0.00"));
    }

    #[test]
    fn test_pihm_to_cycles_missing_day() {
        let dir = tempdir().unwrap();
        let forcing = dir.path().join("forcing.txt");
        let attributes = dir.path().join("att.txt");
        let cropland = dir.path().join("cropland.csv");
        fs::write(&forcing, FORCING).unwrap();
        fs::write(&attributes, "5\t1\t1\t1\t1\t1\t1\t1\t1\t1\n").unwrap();
        fs::write(&cropland, "SP_ID,Y_c,X_c,Zmax,Zmin\n5,8.5,30.1,120.0,100.0\n").unwrap();
        let result = pihm_to_cycles(
            &forcing,
            &attributes,
            &cropland,
            NaiveDate::from_ymd_opt(2017, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2017, 1, 5).unwrap(),
            &dir.path().join("weather.txt"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_project_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("shalehills.para"), "").unwrap();
        fs::write(dir.path().join("shalehills.mesh"), "").unwrap();
        assert_eq!(project_name(dir.path()).unwrap(), "shalehills");

        fs::write(dir.path().join("other.para"), "").unwrap();
        assert!(project_name(dir.path()).is_err());
    }

    fn pihm_project(dir: &Path) -> PathBuf {
        let config = dir.join("mint_run.config");
        fs::write(&config, "[mint]\nstart_year = 2016\nend_year = 2017\nregion = Pongo\n").unwrap();
        fs::write(dir.join("shalehills.para"), "").unwrap();
        config
    }

    #[cfg(unix)]
    #[test]
    fn test_run_pihm_succeeds() {
        let dir = tempdir().unwrap();
        let config = pihm_project(dir.path());
        run_pihm(&config, dir.path(), "true").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_run_pihm_reports_exit_code() {
        let dir = tempdir().unwrap();
        let config = pihm_project(dir.path());
        let err = run_pihm(&config, dir.path(), "false").unwrap_err();
        assert!(matches!(err, FlowError::CommandFailed(1)));
    }

    #[test]
    fn test_run_pihm_without_project() {
        let dir = tempdir().unwrap();
        let config = pihm_project(dir.path());
        fs::remove_file(dir.path().join("shalehills.para")).unwrap();
        assert!(run_pihm(&config, dir.path(), "true").is_err());
    }
}

#[cfg(test)]
mod economic_tests {
    use super::*;
    use crate::economic::*;

    #[test]
    fn test_update_sims_scales_tables() {
        let dir = tempdir().unwrap();
        let price = dir.path().join("price.csv");
        let cost = dir.path().join("cost.csv");
        fs::write(&price, ",price\nmaize,100\nteff,50.5\n").unwrap();
        fs::write(&cost, ",c1,c2\nmaize,10,20\nteff,4,8\n").unwrap();

        let (price_out, cost_out) = update_sims(
            &price,
            &cost,
            &Adjustment(vec![10.0]),
            &Adjustment(vec![-50.0, 0.0]),
            &Adjustment(vec![0.0]),
            &dir.path().to_path_buf(),
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(price_out).unwrap(),
            ",price\nmaize,110.0\nteff,55.55\n"
        );
        assert_eq!(
            fs::read_to_string(cost_out).unwrap(),
            ",c1,c2\nmaize,5.0,20.0\nteff,4.0,8.0\n"
        );
    }

    #[test]
    fn test_update_subsidy_in_place() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("cost.csv");
        fs::write(&file, "crop,c1,c2\nmaize,10,20\nteff,4,3\n").unwrap();
        update_subsidy(&file, 0.5).unwrap();
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "crop,c1,c2\nmaize,10,10.0\nteff,4,1.5\n"
        );

        let other = dir.path().join("other.csv");
        fs::write(&other, "crop,c1\nmaize,10\n").unwrap();
        assert!(matches!(
            update_subsidy(&other, 0.5),
            Err(FlowError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_generate_sim_filters_year_and_region() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data.csv");
        fs::write(
            &data,
            "year,region,crop,land_area,crop_yield,crop_price\n\
             2017,Pongo,maize,100,2.5,300\n\
             2018,Pongo,maize,110,2.6,310\n\
             2017,Other,teff,50,1.5,500\n\
             2017,Pongo,teff,60,1.2,450\n",
        )
        .unwrap();
        let written = generate_sim(&data, "2017", "Pongo", &dir.path().to_path_buf()).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(
            fs::read_to_string(dir.path().join("landdata.csv")).unwrap(),
            ",calib\nmaize,100\nteff,60\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("yielddata.csv")).unwrap(),
            ",calib\nmaize,2.5\nteff,1.2\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("pricedata.csv")).unwrap(),
            ",calib\nmaize,300\nteff,450\n"
        );
    }

    #[test]
    fn test_generate_percent() {
        let dir = tempdir().unwrap();
        let values: Vec<String> = (1..=15).map(|i| i.to_string()).collect();
        generate_percent(&values, dir.path()).unwrap();
        let prices = fs::read_to_string(dir.path().join("simpricedata.csv")).unwrap();
        assert!(prices.starts_with(",sim\nbarley,1\nmaize,2\n"));
        assert!(prices.ends_with("wheat,7\n"));
        let subsidy = fs::read_to_string(dir.path().join("simfertsubsidy.csv")).unwrap();
        assert!(subsidy.starts_with(",sim\nbarley,8\n"));
        assert_eq!(
            fs::read_to_string(dir.path().join("simfertcon.csv")).unwrap(),
            ",sim\nall,15\n"
        );
        assert!(generate_percent(&values[..14], dir.path()).is_err());
    }

    #[test]
    fn test_economic_to_vis_pivots_scenarios() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("mint_run.config");
        fs::write(&config, "[mint]\nend_year = 2017\nregion = Pongo\n").unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(
            &a,
            "crop,fert_subsidy (%),production (kg)\nmaize,0.00,1000\nteff,0.00,500\n",
        )
        .unwrap();
        fs::write(
            &b,
            "crop,fert_subsidy (%),production (kg)\nmaize,20.00,1200\nteff,20.00,550\n",
        )
        .unwrap();
        let output = dir.path().join("vis.csv");
        economic_to_vis(&config, &[&a, &b], &output).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "year,region,crop,Fertilizer_Prices_No_Subsidy_2017,Fertilizer_Prices_20_Subsidy_2017\n\
             2017,Pongo,maize,1000,1200\n\
             2017,Pongo,teff,500,550\n"
        );
    }
}

#[cfg(test)]
mod cycles_tests {
    use super::*;
    use crate::cycles::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::File;

    fn season(yields: &[(&str, f64)]) -> String {
        let mut table = String::from("DATE\tCROP\tGRAIN YIELD\n YYYY-MM-DD\t-\tMg/ha\n");
        for (date, value) in yields {
            table.push_str(&format!("{}\tMaize\t{}\n", date, value));
        }
        table
    }

    fn write_run(dir: &Path, crop: &str, run: &str, table: &str) {
        let path = dir.join(format!("Cycles-{}-{}-results.tar.gz", crop, run));
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(table.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("output/{}/season.dat", crop), table.as_bytes())
            .unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("output/{}/summary.dat", crop), &b"x\n"[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_cycles_to_crop_elasticity_and_defaults() {
        let dir = tempdir().unwrap();
        write_run(
            dir.path(),
            "Maize",
            BASELINE,
            &season(&[("2016-08-01", 3.0), ("2017-08-01", 3.0), ("2017-09-01", 5.0)]),
        );
        write_run(
            dir.path(),
            "Maize",
            DEFAULT_SCENARIO,
            &season(&[("2016-08-01", 3.5), ("2017-08-01", 4.2)]),
        );
        let output = dir.path().join("cyclesdata2016.csv");

        let elasticities = cycles_to_crop(dir.path(), 2017, 0.1, DEFAULT_SCENARIO, &output).unwrap();
        // base mean 4.0, scenario 4.2: 5% more yield for 10% more fertilizer
        assert!((elasticities["Maize"] - 0.5).abs() < 1e-9);

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let rows: Vec<(String, f64)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].to_string(), r[1].parse().unwrap())
            })
            .collect();
        let crops: Vec<&str> = rows.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(crops, vec!["Cassava", "Groundnuts", "Maize", "Sesame", "Sorghum"]);
        assert_eq!(rows[0].1, 0.25);
        assert!((rows[2].1 - 0.5).abs() < 1e-9);
        assert_eq!(rows[4].1, 0.11);
    }

    #[test]
    fn test_cycles_to_crop_missing_year() {
        let dir = tempdir().unwrap();
        let table = season(&[("2016-08-01", 3.0)]);
        write_run(dir.path(), "Maize", BASELINE, &table);
        write_run(dir.path(), "Maize", DEFAULT_SCENARIO, &table);
        let err = cycles_to_crop(
            dir.path(),
            2017,
            0.1,
            DEFAULT_SCENARIO,
            &dir.path().join("out.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::YearNotAvailable(2017)));
    }

    #[test]
    fn test_merge_points_fills_placeholders() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, ",ybarN\nMaize,-99\nSorghum,0.11\n").unwrap();
        fs::write(&b, ",ybarN\nSorghum,0.3\nMaize,0.42\nTeff,0.2\n").unwrap();
        let output = dir.path().join("merged.csv");

        let merged = merge_points(&[&a, &b], &output).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            ",ybarN\nMaize,0.42\nSorghum,0.11\nTeff,0.2\n"
        );
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;
    use crate::catalog::insert_source;
    use serde_yaml::Value;

    #[test]
    fn test_insert_source_updates_components() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cycles")).unwrap();
        fs::create_dir_all(dir.path().join("pihm")).unwrap();
        fs::write(
            dir.path().join("cycles").join("wings-component.yml"),
            "name: cycles\nwings:\n  version: 1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("pihm").join("wings-component.yaml"),
            "name: pihm\nwings:\n  source: old\n",
        )
        .unwrap();
        let catalog = dir.path().join("model.csv");
        fs::write(
            &catalog,
            "folder,model\ncycles,https://models.example.org/cycles\npihm,https://models.example.org/pihm\n",
        )
        .unwrap();

        assert_eq!(insert_source(&catalog).unwrap(), 2);
        let doc: Value = serde_yaml::from_str(
            &fs::read_to_string(dir.path().join("cycles").join("wings-component.yml")).unwrap(),
        )
        .unwrap();
        assert_eq!(doc["wings"]["source"], Value::from("https://models.example.org/cycles"));
        assert_eq!(doc["wings"]["version"], Value::from(1));
        let doc: Value = serde_yaml::from_str(
            &fs::read_to_string(dir.path().join("pihm").join("wings-component.yaml")).unwrap(),
        )
        .unwrap();
        assert_eq!(doc["wings"]["source"], Value::from("https://models.example.org/pihm"));
    }

    #[test]
    fn test_insert_source_missing_component() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join("model.csv");
        fs::write(&catalog, "folder,model\nnowhere,https://x\n").unwrap();
        assert!(insert_source(&catalog).is_err());
    }
}

#[cfg(test)]
mod hand_tests {
    use super::*;
    use crate::hand::hand_vis;
    use std::fs::File;
    use tiff::encoder::{TiffEncoder, colortype};

    #[test]
    fn test_hand_vis_writes_png_with_legend() {
        let dir = tempdir().unwrap();
        let raster = dir.path().join("dd.tif");
        let mut values: Vec<f32> = (0..20).map(|i| i as f32).collect();
        values[19] = f32::NAN;
        {
            let file = File::create(&raster).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            encoder
                .write_image::<colortype::Gray32Float>(5, 4, &values)
                .unwrap();
        }
        let output = dir.path().join("hand.png");
        hand_vis(&raster, "viridis", 3, &output).unwrap();

        let img = image::open(&output).unwrap().to_rgb8();
        assert_eq!(img.width(), 5);
        assert!(img.height() > 4);
        // zero (drainage) shares the lowest class with the smallest height
        assert_ne!(img.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(0, 0).0, img.get_pixel(1, 0).0);
        assert_ne!(img.get_pixel(3, 3).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(4, 3).0, [255, 255, 255]);
    }
}
