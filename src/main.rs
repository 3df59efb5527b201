use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use mintflow::cli::{Cli, Commands, OutputFormat};
use mintflow::dataset::BoundingBox;
use mintflow::flood::{FloodOptions, Provenance};
use mintflow::log::{init_logging, show_farewell_with_timing, show_greeting};
use mintflow::weather::{DAILY_YEARS, WgenRequest};
use mintflow::{catalog, cycles, derive, economic, extract, flood, hand, info, pihm, variables, weather};
use std::fs::File;
use std::io::{self, Write};
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Commands::Completions { shell, output } = &cli.command {
        return generate_completions(*shell, output.as_deref());
    }

    let start_time = Instant::now();
    show_greeting(cli.command.name());
    run(cli.command)?;
    show_farewell_with_timing(start_time.elapsed());
    Ok(())
}

fn generate_completions(shell: clap_complete::Shell, output: Option<&std::path::Path>) -> Result<()> {
    let mut command = Cli::command();
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    clap_complete::generate(shell, &mut command, "mintflow", &mut writer);
    Ok(())
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::OpenNetcdf { files, output } => extract::open_netcdf(&files, &output)
            .with_context(|| format!("Failed to aggregate {} NetCDF files", files.len())),

        Commands::Info {
            file,
            detailed,
            variable,
            format,
        } => {
            let summary = info::summarize(&file, variable.as_deref(), detailed)?;
            match format {
                OutputFormat::Human => {
                    info::print_human(&summary);
                    Ok(())
                }
                OutputFormat::Json => info::print_json(&summary),
                OutputFormat::Yaml => info::print_yaml(&summary),
            }
        }

        Commands::SelectVar {
            store,
            varlist,
            output,
            warnings,
        } => variables::select_var(&store, &varlist, &output, &warnings)
            .with_context(|| format!("Failed to select variables from {}", store.display())),

        Commands::CompleteCheck {
            store,
            varlist,
            output,
        } => variables::complete_check(&store, &varlist, &output)
            .with_context(|| format!("Completeness check failed for {}", store.display())),

        Commands::AdjustUnits {
            store,
            varlist,
            unitlist,
            output,
        } => variables::adjust_units(&store, &varlist, &unitlist, &output)
            .with_context(|| format!("Failed to adjust units in {}", store.display())),

        Commands::AmountToRate {
            store,
            output,
            source,
            hours,
        } => derive::amount_to_rate(&store, &output, &source, hours)
            .with_context(|| format!("Failed to derive precipitation rate from '{}'", source)),

        Commands::CalculateRh {
            store,
            output,
            dewpoint,
            temperature,
        } => derive::calculate_rh(&store, &output, &dewpoint, &temperature)
            .context("Failed to derive relative humidity"),

        Commands::CalculateWind { store, output, u, v } => {
            derive::calculate_wind(&store, &output, &u, &v).context("Failed to derive wind speed")
        }

        Commands::AdjustTime {
            store,
            calendar,
            output,
            time_var,
        } => derive::adjust_time(&store, &calendar, &output, &time_var)
            .with_context(|| format!("Failed to decode '{}'", time_var)),

        Commands::AdjustFormat {
            store,
            varlist,
            outputs,
        } => {
            let names = mintflow::input::read_list_file(&varlist)
                .with_context(|| format!("Failed to read {}", varlist.display()))?;
            derive::adjust_format(&store, &names, &outputs)
                .context("Failed to write binary variables")
        }

        Commands::FloodIndex {
            data,
            thresholds,
            bbox,
            years,
            figures,
            output_dir,
            creator_name,
            creator_email,
            institution,
        } => {
            let options = FloodOptions {
                bbox,
                years: years.0,
                figures,
                output_dir,
                provenance: Provenance {
                    creator_name,
                    creator_email,
                    institution,
                },
            };
            let outputs = flood::run_flood_index(&data, &thresholds, &options)
                .with_context(|| format!("Failed to compute flood index for {}", data.display()))?;
            log::info!("Wrote {} flood index files", outputs.len());
            Ok(())
        }

        Commands::FldasToWgen {
            monthly,
            daily,
            variable,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
            min_month,
            max_month,
            level,
            output,
        } => {
            let request = WgenRequest {
                monthly_dir: monthly,
                daily_dir: daily,
                variable,
                bbox: BoundingBox::new(min_lon, max_lon, min_lat, max_lat)?,
                min_month,
                max_month,
                level,
                available_years: DAILY_YEARS,
            };
            let year = weather::fldas_to_wgen(&request, &output)
                .context("Failed to build weather generator input")?;
            log::info!("Comparison year {}", year);
            Ok(())
        }

        Commands::WgenToFldas {
            wgen_out,
            wgen_in,
            path_out,
            prefix,
        } => {
            let files = weather::wgen_to_fldas(&wgen_out, &wgen_in, &path_out, &prefix)
                .context("Failed to grid weather generator output")?;
            log::info!("Wrote {} daily files", files.len());
            Ok(())
        }

        Commands::HandVis {
            raster,
            cmap,
            bins,
            output,
        } => hand::hand_vis(&raster, &cmap, bins as usize, &output)
            .with_context(|| format!("Failed to render {}", raster.display())),

        Commands::PihmToCycles {
            forcing,
            attributes,
            cropland,
            start,
            end,
            weather,
        } => pihm::pihm_to_cycles(&forcing, &attributes, &cropland, start, end, &weather)
            .context("Failed to convert PIHM forcing"),

        Commands::PihmRun {
            config,
            base_dir,
            executable,
        } => pihm::run_pihm(&config, &base_dir, &executable)
            .with_context(|| format!("PIHM run in {} failed", base_dir.display())),

        Commands::UpdateSims {
            base_price,
            base_cost,
            price,
            c1,
            c2,
            output_dir,
        } => {
            economic::update_sims(&base_price, &base_cost, &price, &c1, &c2, &output_dir)
                .context("Failed to update simulation tables")?;
            Ok(())
        }

        Commands::UpdateSubsidy { file, factor } => economic::update_subsidy(&file, factor)
            .with_context(|| format!("Failed to update subsidy in {}", file.display())),

        Commands::GenerateSim {
            data,
            year,
            region,
            output_dir,
        } => {
            economic::generate_sim(&data, &year, &region, &output_dir)
                .with_context(|| format!("Failed to split {} for {} {}", data.display(), region, year))?;
            Ok(())
        }

        Commands::GeneratePercent { values, output_dir } => {
            economic::generate_percent(&values, &output_dir)
                .context("Failed to write simulation percentages")?;
            Ok(())
        }

        Commands::EconomicToVis {
            config,
            files,
            output,
        } => economic::economic_to_vis(&config, &files, &output)
            .context("Failed to build visualisation table"),

        Commands::CyclesToCrop {
            dir,
            year,
            percent_fertilizer,
            scenario,
            output,
        } => {
            cycles::cycles_to_crop(&dir, year, percent_fertilizer, &scenario, &output)
                .with_context(|| format!("Failed to read Cycles runs in {}", dir.display()))?;
            Ok(())
        }

        Commands::MergePoints { files, output } => {
            cycles::merge_points(&files, &output).context("Failed to merge point tables")?;
            Ok(())
        }

        Commands::InsertSource { catalog } => {
            let count = catalog::insert_source(&catalog)
                .with_context(|| format!("Failed to apply {}", catalog.display()))?;
            log::info!("Updated {} components", count);
            Ok(())
        }

        Commands::Completions { shell, output } => generate_completions(shell, output.as_deref()),
    }
}
