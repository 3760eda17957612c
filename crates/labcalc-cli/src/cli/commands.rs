use super::helpers::*;
use super::{CliError, GlobalArgs};
use labcalc_core::common::format::{
    format_grouped, format_microliters, format_molar, format_quantity,
};
use labcalc_core::common::units::{MASS_CONCENTRATION, MOLARITY, VOLUME};
use labcalc_core::domain::LabError;
use labcalc_core::modules::dilution::{DEFAULT_SOLVENT, DilutionPlan, SOLVENT_OPTIONS};
use labcalc_core::modules::doe::FactorLevels;
use labcalc_core::modules::reagents::ReagentPatch;
use labcalc_core::modules::serial::ConcentrationBasis;
use labcalc_core::modules::{
    CascadeRequest, DilutionRequest, RangeSpec, Reagent, SerialRequest, box_behnken,
    calculate_dilution, full_factorial, plan_cascade, plan_serial_dilution,
};
use std::collections::BTreeMap;

#[derive(clap::Args, Debug)]
pub(super) struct ReagentFlags {
    /// Reagent name; its stored molecular weight is used when --mw is omitted
    #[arg(long)]
    reagent: Option<String>,

    /// Molecular weight in g/mol
    #[arg(long)]
    mw: Option<f64>,

    /// Diluent used for every addition
    #[arg(long, default_value = DEFAULT_SOLVENT)]
    solvent: String,
}

#[derive(clap::Args, Debug)]
pub(super) struct DiluteArgs {
    /// Stock concentration value
    #[arg(long)]
    stock: f64,

    /// Stock concentration unit (molar or mass/volume)
    #[arg(long, default_value = "mM")]
    stock_unit: String,

    /// Target concentration value
    #[arg(long)]
    target: f64,

    /// Target concentration unit
    #[arg(long, default_value = "µM")]
    target_unit: String,

    /// Final volume value
    #[arg(long)]
    volume: f64,

    /// Final volume unit
    #[arg(long, default_value = "mL")]
    volume_unit: String,

    /// Also weigh out solid to prepare this much stock
    #[arg(long, value_name = "VOLUME")]
    prepare_stock: Option<f64>,

    /// Unit of --prepare-stock
    #[arg(long, default_value = "mL")]
    prepare_stock_unit: String,

    #[command(flatten)]
    reagent: ReagentFlags,
}

#[derive(clap::Args, Debug)]
pub(super) struct SerialArgs {
    /// Stock concentration value
    #[arg(long)]
    stock: f64,

    /// Stock concentration unit
    #[arg(long, default_value = "mM")]
    stock_unit: String,

    /// Dilution factor between consecutive tubes
    #[arg(long, default_value_t = 10.0)]
    factor: f64,

    /// Number of tubes
    #[arg(long, default_value_t = 5)]
    tubes: usize,

    /// Final volume per tube
    #[arg(long, default_value_t = 1000.0)]
    volume: f64,

    /// Unit of --volume
    #[arg(long, default_value = "µL")]
    volume_unit: String,

    #[command(flatten)]
    reagent: ReagentFlags,
}

#[derive(clap::Args, Debug)]
pub(super) struct CascadeArgs {
    /// Main stock concentration value
    #[arg(long)]
    main_stock: f64,

    /// Main stock concentration unit
    #[arg(long, default_value = "mM")]
    main_stock_unit: String,

    /// Highest (first) point concentration value
    #[arg(long)]
    highest: f64,

    /// Highest point concentration unit
    #[arg(long, default_value = "µM")]
    highest_unit: String,

    /// Final volume per point
    #[arg(long, default_value_t = 100.0)]
    volume: f64,

    /// Unit of --volume
    #[arg(long, default_value = "µL")]
    volume_unit: String,

    /// Points in the upper sparse range
    #[arg(long, default_value_t = 2)]
    upper_points: usize,

    /// Dilution factor in the upper sparse range
    #[arg(long, default_value_t = 10.0)]
    upper_factor: f64,

    /// Points in the dense range
    #[arg(long, default_value_t = 6)]
    dense_points: usize,

    /// Dilution factor in the dense range
    #[arg(long, default_value_t = 2.0)]
    dense_factor: f64,

    /// Points in the lower sparse range
    #[arg(long, default_value_t = 2)]
    lower_points: usize,

    /// Dilution factor in the lower sparse range
    #[arg(long, default_value_t = 10.0)]
    lower_factor: f64,

    #[command(flatten)]
    reagent: ReagentFlags,
}

#[derive(clap::Subcommand, Debug)]
pub(super) enum DoeCommand {
    /// Every combination of the given levels
    Factorial {
        /// Comma-separated levels of one variable; repeat per variable
        #[arg(long = "levels", required = true, value_name = "LEVELS")]
        levels: Vec<String>,
    },
    /// Box-Behnken response-surface design
    BoxBehnken {
        /// Number of factors
        #[arg(long, default_value_t = 3)]
        factors: usize,

        /// Number of center points
        #[arg(long, default_value_t = 3)]
        center_points: usize,

        /// LOW,CENTER,HIGH for one factor; repeat once per factor to map coded levels
        #[arg(long = "level", value_name = "LOW,CENTER,HIGH", value_parser = parse_factor_levels)]
        levels: Vec<FactorLevels>,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(super) enum ReagentCommand {
    /// Add a new reagent
    Add {
        name: String,

        /// Molecular weight in g/mol
        #[arg(long)]
        mw: f64,

        /// Manufacturer or catalog number
        #[arg(long, default_value = "")]
        manufacturer: String,

        /// Extra KEY=VALUE field; repeatable
        #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Change fields of an existing reagent
    Edit {
        name: String,

        #[arg(long)]
        mw: Option<f64>,

        #[arg(long)]
        manufacturer: Option<String>,

        /// Extra KEY=VALUE field; repeatable
        #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Remove a reagent
    Delete { name: String },
    /// Show stored reagents
    List {
        /// Only names matching this glob
        #[arg(long)]
        filter: Option<String>,
    },
}

pub(super) fn run_dilute_command(global: &GlobalArgs, args: DiluteArgs) -> Result<i32, CliError> {
    let policy = load_policy(global)?;
    let selection = select_reagent(global, args.reagent.reagent.as_deref(), args.reagent.mw)?;

    let mut request = DilutionRequest::new(
        parse_concentration(args.stock, &args.stock_unit)?,
        parse_concentration(args.target, &args.target_unit)?,
        parse_volume(args.volume, &args.volume_unit)?,
    )
    .with_solvent(args.reagent.solvent)
    .with_molecular_weight(selection.molecular_weight);
    if let Some(name) = selection.name.as_deref() {
        request = request.with_reagent_name(name);
    }
    if let Some(prepare_stock) = args.prepare_stock {
        request = request.with_solid_prep(parse_volume(prepare_stock, &args.prepare_stock_unit)?);
    }

    let result = calculate_dilution(&request, &policy)?;
    let mut headline = vec![
        format!("Reagent: {} in {}", result.reagent_name, result.solvent),
        format!("Dilution factor: {}", format_grouped(result.dilution_factor, 2)),
        format!("Stock volume: {}", format_microliters(result.stock_volume_l)),
        format!("Diluent volume: {}", format_microliters(result.diluent_volume_l)),
    ];
    if let Some(prep) = result.solid_prep {
        headline.push(format!(
            "Solid to weigh: {} mg into {}",
            format_grouped(prep.mass_mg(), 4),
            format_microliters(prep.stock_volume_l)
        ));
    }
    if let DilutionPlan::TwoStage(plan) = result.plan {
        headline.push(format!(
            "Two-stage protocol recommended: 1:{} then 1:{}",
            format_grouped(plan.first_stage_factor, 0),
            format_grouped(plan.second_stage_factor, 2)
        ));
    }

    emit_report(global, &result, Some(result.reagent_name.as_str()), &headline)?;
    Ok(0)
}

pub(super) fn run_serial_command(global: &GlobalArgs, args: SerialArgs) -> Result<i32, CliError> {
    let selection = select_reagent(global, args.reagent.reagent.as_deref(), args.reagent.mw)?;
    let mut request = SerialRequest::new(
        args.stock,
        &args.stock_unit,
        args.factor,
        args.tubes,
        parse_volume(args.volume, &args.volume_unit)?,
    )?
    .with_solvent(args.reagent.solvent)
    .with_molecular_weight(selection.molecular_weight);
    if let Some(name) = selection.name.as_deref() {
        request = request.with_reagent_name(name);
    }

    let result = plan_serial_dilution(&request)?;
    let basis = match result.basis {
        ConcentrationBasis::Molar => "molar",
        ConcentrationBasis::MassPerVolume => "mass/volume",
    };
    let headline = vec![
        format!("Reagent: {} in {}", result.reagent_name, result.solvent),
        format!(
            "Stock: {} ({} basis)",
            format_quantity(request.stock_value, &result.stock_unit),
            basis
        ),
        format!("Transfer volume: {}", format_microliters(result.volumes.transfer_volume_l)),
        format!("Total stock needed: {}", format_microliters(result.volumes.stock_for_first_l)),
        format!("Total diluent needed: {}", format_microliters(result.volumes.total_diluent_l)),
    ];

    emit_report(global, &result, Some(result.reagent_name.as_str()), &headline)?;
    Ok(0)
}

pub(super) fn run_cascade_command(global: &GlobalArgs, args: CascadeArgs) -> Result<i32, CliError> {
    let policy = load_policy(global)?;
    let selection = select_reagent(global, args.reagent.reagent.as_deref(), args.reagent.mw)?;

    let mut request = CascadeRequest::new(
        parse_concentration(args.main_stock, &args.main_stock_unit)?,
        parse_concentration(args.highest, &args.highest_unit)?,
        parse_volume(args.volume, &args.volume_unit)?,
    )
    .with_ranges(
        RangeSpec::new(args.upper_points, args.upper_factor),
        RangeSpec::new(args.dense_points, args.dense_factor),
        RangeSpec::new(args.lower_points, args.lower_factor),
    )
    .with_solvent(args.reagent.solvent)
    .with_molecular_weight(selection.molecular_weight);
    if let Some(name) = selection.name.as_deref() {
        request = request.with_reagent_name(name);
    }

    let result = plan_cascade(&request, &policy)?;
    let mut headline = vec![
        format!("Reagent: {} in {}", result.reagent_name, result.solvent),
        format!(
            "Main stock: {}, {} points",
            format_molar(result.main_stock_molar),
            result.points.len()
        ),
    ];
    for range in &result.ranges {
        let prep = &range.preparation;
        let mut line = format!(
            "{}: points {}-{} at 1:{}, first tube from {} ({})",
            range.kind.label(),
            range.first_point,
            range.last_point,
            format_grouped(range.factor, 2),
            prep.source_label,
            format_molar(prep.source_concentration_molar)
        );
        if let Some(intermediate) = prep.intermediate {
            line.push_str(&format!(
                ", via 1:{} intermediate",
                format_grouped(intermediate.factor, 0)
            ));
        }
        if prep.below_pipette_floor {
            line.push_str(&format!(
                ", WARNING {} is below the {} µL pipetting floor",
                format_microliters(prep.stock_volume_l),
                policy.min_pipette_volume_ul
            ));
        }
        headline.push(line);
    }

    emit_report(global, &result, Some(result.reagent_name.as_str()), &headline)?;
    Ok(0)
}

pub(super) fn run_doe_command(global: &GlobalArgs, command: DoeCommand) -> Result<i32, CliError> {
    match command {
        DoeCommand::Factorial { levels } => {
            let levels: Vec<Vec<String>> = levels.iter().map(|raw| parse_level_list(raw)).collect();
            let design = full_factorial(&levels)?;
            let headline = vec![format!(
                "Full factorial: {} variables, {} runs",
                design.variables.len(),
                design.run_count()
            )];
            emit_report(global, &design, None, &headline)?;
        }
        DoeCommand::BoxBehnken {
            factors,
            center_points,
            levels,
        } => {
            let mut design = box_behnken(factors, center_points)?;
            if !levels.is_empty() {
                design = design.with_levels(&levels)?;
            }
            let headline = vec![format!(
                "Box-Behnken: {} factors, {} center points, {} runs",
                design.factor_count,
                design.center_points,
                design.run_count()
            )];
            emit_report(global, &design, None, &headline)?;
        }
    }
    Ok(0)
}

pub(super) fn run_reagent_command(
    global: &GlobalArgs,
    command: ReagentCommand,
) -> Result<i32, CliError> {
    let mut store = load_store(global)?;
    match command {
        ReagentCommand::Add {
            name,
            mw,
            manufacturer,
            fields,
        } => {
            let mut reagent = Reagent::new(name, mw).with_manufacturer(manufacturer);
            reagent.extra.extend(fields);
            let name = reagent.name.trim().to_string();
            store.add(reagent)?;
            store.save().map_err(LabError::from)?;
            println!("Saved '{name}'.");
        }
        ReagentCommand::Edit {
            name,
            mw,
            manufacturer,
            fields,
        } => {
            let patch = ReagentPatch {
                molecular_weight: mw,
                manufacturer,
                extra: fields.into_iter().collect::<BTreeMap<_, _>>(),
            };
            store.update(&name, patch)?;
            store.save().map_err(LabError::from)?;
            println!("Updated '{name}'.");
        }
        ReagentCommand::Delete { name } => {
            store.delete(&name)?;
            store.save().map_err(LabError::from)?;
            println!("Deleted '{name}'.");
        }
        ReagentCommand::List { filter } => {
            let listing = store.listing(filter.as_deref())?;
            if listing.reagents.is_empty() && !global.json {
                println!("No reagents saved yet.");
                return Ok(0);
            }
            let headline = vec![format!(
                "{} reagents in {}",
                listing.reagents.len(),
                store.path().display()
            )];
            emit_report(global, &listing, None, &headline)?;
        }
    }
    Ok(0)
}

pub(super) fn run_units_command(global: &GlobalArgs) -> Result<i32, CliError> {
    let tables = [MOLARITY, MASS_CONCENTRATION, VOLUME];
    if global.json {
        let mut units = BTreeMap::new();
        for table in tables {
            units.insert(table.name(), table.symbols().collect::<Vec<_>>());
        }
        units.insert("solvent", SOLVENT_OPTIONS.to_vec());
        let json = serde_json::to_string_pretty(&units)
            .map_err(|error| CliError::Internal(error.into()))?;
        println!("{json}");
        return Ok(0);
    }

    for table in tables {
        println!(
            "{} (base {}): {}",
            table.name(),
            table.base_unit(),
            table.symbols().collect::<Vec<_>>().join(", ")
        );
    }
    println!("solvents: {}", SOLVENT_OPTIONS.join(", "));
    Ok(0)
}
