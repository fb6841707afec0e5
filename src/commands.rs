//! Command handlers for the CLI.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use weighbridge::catalog::field;
use weighbridge::config::{self, AppConfig, ConfigOverrides};
use weighbridge::db::{self, DbState};
use weighbridge::diagnostics;
use weighbridge::ledger::Ledger;
use weighbridge::report;
use weighbridge::scale::{ConnectionState, ScaleEvent, ScaleLink};
use weighbridge::serial::{self, SerialPortProvider};
use weighbridge::session::{TicketForm, WeighSession};
use weighbridge::ticket::render_ticket;
use weighbridge::weight_frame::match_frame;
use weighbridge::model::FieldConfig;
use weighbridge::{Reconciler, Transaction, VehicleMatch};

use crate::cli::{
    parse_field_arg, Cli, Commands, ConfigCommand, DestinationCommand, FieldCommand, FormArgs,
    MaterialCommand, PreRegisterCommand, ScaleArgs,
};

const SITE_NAME: &str = "Weighbridge";

struct CommandContext {
    config: AppConfig,
    db: DbState,
    json: bool,
}

impl CommandContext {
    fn reconciler(self) -> Result<(Reconciler<DbState>, AppConfig, bool)> {
        let catalog = self.db.load_catalog().context("loading reference data")?;
        let reconciler = Reconciler::new(self.db, catalog)
            .with_ticket_prefix(self.config.ticket_prefix.clone());
        Ok((reconciler, self.config, self.json))
    }

    fn scale_link(&self, args: &ScaleArgs) -> ScaleLink {
        let port = args.port.clone().or_else(|| self.config.scale_port.clone());
        let framing = args.framing.unwrap_or(self.config.framing);
        ScaleLink::new(Arc::new(SerialPortProvider::new(port)), framing)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ticket_line(tx: &Transaction) -> String {
    let second = tx
        .second_weight
        .map(|w| format!("{w} kg"))
        .unwrap_or_else(|| "-".into());
    let net = tx
        .net_weight
        .map(|w| format!("{w} kg"))
        .unwrap_or_else(|| "-".into());
    format!(
        "{:<18} {:<12} {:<12} {:<18} {:>10} {:>10} {:>10} {:<8} {}",
        tx.ticket_number,
        tx.vehicle_reg,
        tx.material,
        tx.destination,
        format!("{} kg", tx.first_weight),
        second,
        net,
        tx.status,
        tx.id
    )
}

fn describe_match(matched: &VehicleMatch) -> String {
    match matched {
        VehicleMatch::MatchedPartial(tx) => format!(
            "open partial ticket {} (weight 1: {} kg) - capture weight 2",
            tx.ticket_number, tx.first_weight
        ),
        VehicleMatch::MatchedPreRegistration(pre) => format!(
            "pre-registered: {} to {}, weight 1: {} kg",
            pre.material, pre.destination, pre.first_weight
        ),
        VehicleMatch::NoMatch => "new vehicle - weight 1 only".to_string(),
    }
}

fn apply_form_args(form: &mut TicketForm, args: &FormArgs) -> Result<()> {
    if let Some(material) = &args.material {
        form.set_field(field::MATERIAL, material)?;
    }
    if let Some(destination) = &args.destination {
        form.set_field(field::DESTINATION, destination)?;
    }
    if let Some(notes) = &args.notes {
        form.set_field("notes", notes)?;
    }
    for raw in &args.fields {
        let Some((name, value)) = parse_field_arg(raw) else {
            bail!("expected NAME=VALUE, got {raw:?}");
        };
        form.set_field(name, value)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

pub async fn run(cli: Cli, data_dir: PathBuf) -> Result<()> {
    // Commands that need no store
    match &cli.command {
        Commands::Ports => return ports(cli.json),
        Commands::Parse { frames } => return parse(frames, cli.json),
        _ => {}
    }

    let db = db::init(&data_dir).context("opening the weighbridge database")?;
    let config = {
        let conn = db.lock();
        AppConfig::load(
            data_dir,
            &conn,
            ConfigOverrides {
                operator: cli.operator.clone(),
                log_filter: cli.log_filter.clone(),
                ..ConfigOverrides::default()
            },
        )?
    };
    let ctx = CommandContext {
        config,
        db,
        json: cli.json,
    };

    match cli.command {
        Commands::Ports | Commands::Parse { .. } => Ok(()),
        Commands::Monitor { scale } => monitor(&ctx, &scale).await,
        Commands::Weigh {
            vehicle,
            scale,
            form,
            readings,
        } => weigh(ctx, &vehicle, &scale, &form, readings).await,
        Commands::Resolve { vehicle } => resolve(ctx, &vehicle),
        Commands::Submit {
            vehicle,
            form,
            first_weight,
            second_weight,
        } => submit(ctx, &vehicle, &form, first_weight, second_weight),
        Commands::Tickets { partial } => tickets(&ctx, partial),
        Commands::Show { ticket } => show(&ctx, &ticket),
        Commands::DeleteTicket { id } => delete_ticket(ctx, &id),
        Commands::Suggest { text } => suggest(ctx, &text),
        Commands::Report { from, to, csv } => report_cmd(&ctx, from, to, csv),
        Commands::PreRegister(cmd) => pre_register(ctx, cmd),
        Commands::Materials(cmd) => materials(&ctx, cmd),
        Commands::Destinations(cmd) => destinations(&ctx, cmd),
        Commands::Fields(cmd) => fields(&ctx, cmd),
        Commands::Config(cmd) => config_cmd(&ctx, cmd),
        Commands::Status => status(&ctx),
    }
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

fn ports(json: bool) -> Result<()> {
    let ports = serial::list_ports()?;
    if json {
        return print_json(&ports);
    }
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let detail = [port.manufacturer.as_deref(), port.product.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:<20} {:<8} {}", port.name, port.port_type, detail);
    }
    Ok(())
}

fn parse(frames: &[String], json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct Decoded<'a> {
        frame: &'a str,
        rule: Option<&'static str>,
        value: Option<f64>,
    }

    let decoded: Vec<Decoded<'_>> = frames
        .iter()
        .map(|frame| {
            let hit = match_frame(frame);
            Decoded {
                frame,
                rule: hit.map(|m| m.rule),
                value: hit.map(|m| m.value),
            }
        })
        .collect();
    if json {
        return print_json(&decoded);
    }
    for d in decoded {
        match (d.value, d.rule) {
            (Some(value), Some(rule)) => println!("{:<30} {value} ({rule})", format!("{:?}", d.frame)),
            _ => println!("{:<30} no value", format!("{:?}", d.frame)),
        }
    }
    Ok(())
}

async fn monitor(ctx: &CommandContext, args: &ScaleArgs) -> Result<()> {
    let link = ctx.scale_link(args);
    let mut events = link.subscribe();
    link.connect().await.context("connecting to the scale")?;
    let status = link.status();
    if ctx.json {
        print_json(&status)?;
    } else {
        println!(
            "Connected to {}. Press Ctrl-C to stop.",
            status.device.as_deref().unwrap_or("scale")
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ScaleEvent::Weight { value }) => println!("{value} kg"),
                Ok(ScaleEvent::StateChanged { state }) => {
                    println!("scale {state}");
                    if matches!(state, ConnectionState::Disconnected | ConnectionState::Error) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Scale events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    link.disconnect().await;
    Ok(())
}

async fn weigh(
    ctx: CommandContext,
    vehicle: &str,
    scale: &ScaleArgs,
    form_args: &FormArgs,
    max_readings: Option<usize>,
) -> Result<()> {
    let link = ctx.scale_link(scale);
    let (mut reconciler, config, json) = ctx.reconciler()?;

    let mut session = WeighSession::new();
    reconciler.select_vehicle(&mut session, vehicle)?;
    apply_form_args(session.form_mut(), form_args)?;
    println!("{}: {}", session.form().vehicle_reg, describe_match(session.matched()));

    let mut events = link.subscribe();
    link.connect().await.context("connecting to the scale")?;
    println!("Capturing into {}. Press Ctrl-C to record the ticket.", session.active_slot());

    let mut readings = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ScaleEvent::Weight { value }) => {
                    let reading = session.apply_weight(value);
                    println!("{} = {} kg", reading.slot, reading.value);
                    readings += 1;
                    if max_readings.is_some_and(|max| readings >= max) {
                        break;
                    }
                }
                Ok(ScaleEvent::StateChanged { state }) => {
                    if matches!(state, ConnectionState::Disconnected | ConnectionState::Error) {
                        warn!(%state, "Scale link ended during capture");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Scale events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    link.disconnect().await;

    let tx = reconciler.submit_session(&mut session, &config.operator)?;
    info!(ticket = %tx.ticket_number, readings, "Live weighing recorded");
    if json {
        return print_json(&tx);
    }
    print!("{}", render_ticket(&tx, SITE_NAME));
    Ok(())
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

fn resolve(ctx: CommandContext, vehicle: &str) -> Result<()> {
    let (reconciler, _, json) = ctx.reconciler()?;
    let matched = reconciler.resolve(vehicle)?;
    if json {
        return print_json(&matched);
    }
    println!("{}", describe_match(&matched));
    Ok(())
}

fn submit(
    ctx: CommandContext,
    vehicle: &str,
    form_args: &FormArgs,
    first_weight: Option<String>,
    second_weight: Option<String>,
) -> Result<()> {
    let (mut reconciler, config, json) = ctx.reconciler()?;
    let mut session = WeighSession::new();
    reconciler.select_vehicle(&mut session, vehicle)?;

    let form = session.form_mut();
    apply_form_args(form, form_args)?;
    if let Some(raw) = first_weight {
        form.set_field(field::FIRST_WEIGHT, &raw)?;
    }
    if let Some(raw) = second_weight {
        form.set_field(field::SECOND_WEIGHT, &raw)?;
    }

    let tx = reconciler.submit_session(&mut session, &config.operator)?;
    if json {
        return print_json(&tx);
    }
    print!("{}", render_ticket(&tx, SITE_NAME));
    Ok(())
}

fn tickets(ctx: &CommandContext, partial_only: bool) -> Result<()> {
    let mut all = ctx.db.transactions()?;
    if partial_only {
        all.retain(|t| t.is_partial());
    }
    // Newest first
    all.reverse();
    if ctx.json {
        return print_json(&all);
    }
    for tx in &all {
        println!("{}", ticket_line(tx));
    }
    Ok(())
}

fn show(ctx: &CommandContext, ticket: &str) -> Result<()> {
    let Some(tx) = ctx
        .db
        .transactions()?
        .into_iter()
        .find(|t| t.ticket_number == ticket || t.id == ticket)
    else {
        bail!("no ticket {ticket}");
    };
    if ctx.json {
        return print_json(&tx);
    }
    print!("{}", render_ticket(&tx, SITE_NAME));
    Ok(())
}

fn delete_ticket(ctx: CommandContext, id: &str) -> Result<()> {
    let (mut reconciler, _, _) = ctx.reconciler()?;
    if !reconciler.delete_transaction(id)? {
        bail!("no ticket with id {id}");
    }
    println!("Deleted {id}");
    Ok(())
}

fn suggest(ctx: CommandContext, text: &str) -> Result<()> {
    let (reconciler, _, json) = ctx.reconciler()?;
    let regs = reconciler.suggest(text)?;
    if json {
        return print_json(&regs);
    }
    for reg in regs {
        println!("{reg}");
    }
    Ok(())
}

fn report_cmd(
    ctx: &CommandContext,
    from: chrono::NaiveDate,
    to: chrono::NaiveDate,
    csv: Option<PathBuf>,
) -> Result<()> {
    let (start, end) = report::period_bounds(from, to)?;
    let rows = {
        let conn = ctx.db.lock();
        db::transactions_between(&conn, start, end)?
    };
    let report = report::period_report(rows, from, to)?;

    match csv {
        Some(path) if path.as_os_str() == "-" => {
            report::write_csv(&report, std::io::stdout().lock())?;
        }
        Some(path) => {
            let path = if path.is_dir() {
                path.join(report.file_name(&ctx.config.ticket_prefix))
            } else {
                path
            };
            let file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            report::write_csv(&report, file)?;
            info!(path = %path.display(), rows = report.rows.len(), "Report exported");
            println!("Wrote {} rows to {}", report.rows.len(), path.display());
        }
        None if ctx.json => print_json(&report)?,
        None => {
            let s = &report.summary;
            println!("Report {} to {}", report.start, report.end);
            println!("Total Transactions: {}", s.total);
            println!("Completed: {}", s.completed);
            println!("Partial: {}", s.partial);
            println!("Total Value: {:.2}", s.total_value);
            for tx in &report.rows {
                println!("{}", ticket_line(tx));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

fn pre_register(ctx: CommandContext, cmd: PreRegisterCommand) -> Result<()> {
    let (mut reconciler, config, json) = ctx.reconciler()?;
    match cmd {
        PreRegisterCommand::Add {
            vehicle,
            material,
            destination,
            first_weight,
        } => {
            let record = reconciler.pre_register(
                &vehicle,
                &material,
                &destination,
                first_weight,
                &config.operator,
            )?;
            if json {
                return print_json(&record);
            }
            println!("Pre-registered {} ({})", record.vehicle_reg, record.id);
        }
        PreRegisterCommand::List => {
            let records = reconciler.ledger().pre_registrations()?;
            if json {
                return print_json(&records);
            }
            for p in records {
                println!(
                    "{:<12} {:<12} {:<18} {:>10} {} {}",
                    p.vehicle_reg,
                    p.material,
                    p.destination,
                    format!("{} kg", p.first_weight),
                    p.timestamp.format("%Y-%m-%d %H:%M"),
                    p.id
                );
            }
        }
        PreRegisterCommand::Delete { id } => {
            if !reconciler.delete_pre_registration(&id)? {
                bail!("no pre-registration with id {id}");
            }
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn materials(ctx: &CommandContext, cmd: MaterialCommand) -> Result<()> {
    let conn = ctx.db.lock();
    match cmd {
        MaterialCommand::List => {
            let list = db::list_materials(&conn)?;
            if ctx.json {
                return print_json(&list);
            }
            for m in list {
                println!("{:<16} {:>8.2} /{}", m.name, m.price_per_unit, m.unit);
            }
        }
        MaterialCommand::Set { name, price, unit } => {
            let m = db::upsert_material(&conn, &name, &unit, price)?;
            println!("{} = {:.2} /{}", m.name, m.price_per_unit, m.unit);
        }
        MaterialCommand::Delete { name } => {
            if !db::delete_material(&conn, &name)? {
                bail!("no material named {name}");
            }
            println!("Deleted {name}");
        }
    }
    Ok(())
}

fn destinations(ctx: &CommandContext, cmd: DestinationCommand) -> Result<()> {
    let conn = ctx.db.lock();
    match cmd {
        DestinationCommand::List => {
            let list = db::list_destinations(&conn)?;
            if ctx.json {
                return print_json(&list);
            }
            for d in list {
                println!("{}", d.name);
            }
        }
        DestinationCommand::Add { name } => {
            let d = db::add_destination(&conn, &name)?;
            println!("Added {}", d.name);
        }
        DestinationCommand::Delete { name } => {
            if !db::delete_destination(&conn, &name)? {
                bail!("no destination named {name}");
            }
            println!("Deleted {name}");
        }
    }
    Ok(())
}

fn fields(ctx: &CommandContext, cmd: FieldCommand) -> Result<()> {
    let conn = ctx.db.lock();
    match cmd {
        FieldCommand::List => {
            let list = db::list_field_configs(&conn)?;
            if ctx.json {
                return print_json(&list);
            }
            for f in list {
                let required = if f.required { "required" } else { "optional" };
                println!("{:<3} {:<14} {:<22} {:<7} {}", f.order, f.name, f.label, f.kind.as_str(), required);
            }
        }
        FieldCommand::Set {
            name,
            label,
            kind,
            required,
            options,
            order,
        } => {
            let existing = db::list_field_configs(&conn)?;
            let order = match order {
                Some(order) => order,
                None => existing
                    .iter()
                    .find(|f| f.name == name)
                    .map(|f| f.order)
                    .unwrap_or_else(|| existing.iter().map(|f| f.order).max().unwrap_or(0) + 1),
            };
            let config = FieldConfig {
                id: name.clone(),
                name,
                label,
                kind,
                required,
                options,
                order,
            };
            db::save_field_config(&conn, &config)?;
            if ctx.json {
                return print_json(&config);
            }
            println!("{} ({}) saved at position {}", config.name, config.label, config.order);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings and status
// ---------------------------------------------------------------------------

fn config_cmd(ctx: &CommandContext, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let stored = db::get_all_settings(&ctx.db.lock())?;
            print_json(&serde_json::json!({
                "effective": ctx.config,
                "stored": stored,
            }))
        }
        ConfigCommand::Set { key, value } => {
            config::set_value(&ctx.db.lock(), &key, &value)?;
            println!("{key} = {}", value.trim());
            Ok(())
        }
    }
}

fn status(ctx: &CommandContext) -> Result<()> {
    let mut about = diagnostics::get_about_info();
    about["store"] = diagnostics::get_store_health(&ctx.db)?;
    about["dataDir"] = ctx.config.data_dir.display().to_string().into();
    print_json(&about)?;
    std::io::stdout().flush()?;
    Ok(())
}
