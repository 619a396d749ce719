use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use staffdb::config::Config;
use staffdb::db::Store;
use staffdb::model::{DynamicEmployee, Employee};
use staffdb::service::{EmployeeService, GroupBy, MatchMode};
use staffdb::value::{FieldType, FieldValue};

#[derive(Parser, Debug)]
#[command(name = "staffdb")]
#[command(about = "Employee records with runtime-extensible columns")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/staffdb/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Database file (overrides the config)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Print results as JSON
  #[arg(long)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ColumnTypeArg {
  Text,
  Integer,
  Decimal,
  Date,
  Boolean,
}

impl From<ColumnTypeArg> for FieldType {
  fn from(arg: ColumnTypeArg) -> Self {
    match arg {
      ColumnTypeArg::Text => FieldType::Text,
      ColumnTypeArg::Integer => FieldType::Integer,
      ColumnTypeArg::Decimal => FieldType::Decimal,
      ColumnTypeArg::Date => FieldType::Date,
      ColumnTypeArg::Boolean => FieldType::Boolean,
    }
  }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReportArg {
  Title,
  Division,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Add an employee
  Add {
    name: String,
    title: String,
    division: String,
    salary: f64,
    pay_type: String,
    /// Dynamic field assignment, NAME=VALUE (repeatable)
    #[arg(long = "field", value_name = "NAME=VALUE")]
    fields: Vec<String>,
  },
  /// Show one employee
  Get { id: i64 },
  /// List all employees
  List,
  /// Set one dynamic field
  Set {
    id: i64,
    field: String,
    /// Value to store; omit together with --clear to set NULL
    value: Option<String>,
    /// Clear the field (store NULL)
    #[arg(long, conflicts_with = "value")]
    clear: bool,
  },
  /// Update the base fields of an employee
  Update {
    id: i64,
    name: String,
    title: String,
    division: String,
    salary: f64,
    pay_type: String,
  },
  /// Delete an employee
  Delete { id: i64 },
  /// Add a dynamic column to the schema
  AddColumn {
    name: String,
    #[arg(value_enum)]
    r#type: ColumnTypeArg,
    /// Default value applied to every existing employee
    #[arg(long)]
    default: Option<String>,
  },
  /// List the dynamic columns
  Columns,
  /// Search by employee name or by a dynamic field value
  Search {
    value: String,
    /// Field to search: "name" or a dynamic column (default: the configured
    /// business key)
    #[arg(long)]
    field: Option<String>,
    /// Substring match instead of exact equality
    #[arg(long)]
    pattern: bool,
  },
  /// Raise salaries in [MIN, MAX) by PERCENT
  Raise { min: f64, max: f64, percent: f64 },
  /// Total pay grouped by title or division
  Report {
    #[arg(value_enum)]
    by: ReportArg,
  },
}

fn main() -> Result<()> {
  color_eyre::install()?;
  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let config = Config::load(args.config.as_deref())?;

  let db_path = match args.db.clone().or_else(|| config.database.clone()) {
    Some(path) => path,
    None => Store::default_path()?,
  };
  let store = Arc::new(Store::open(&db_path)?);
  store.set_busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
  let service = EmployeeService::new(store)?;

  run(args.command, &service, &config, args.json)
}

fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("staffdb");
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::never(&log_dir, "staffdb.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("staffdb=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(guard)
}

fn run(command: Command, service: &EmployeeService, config: &Config, json: bool) -> Result<()> {
  match command {
    Command::Add {
      name,
      title,
      division,
      salary,
      pay_type,
      fields,
    } => {
      let base = Employee {
        id: 0,
        name,
        title,
        division,
        salary,
        pay_type,
      };
      let mut employee = DynamicEmployee::new(base);
      employee.fields = parse_field_args(service, &fields)?;
      let id = service.add(&employee)?;
      println!("added employee {}", id);
    }
    Command::Get { id } => {
      print_employees(std::slice::from_ref(&service.get(id)?), json)?;
    }
    Command::List => {
      print_employees(&service.list_all()?, json)?;
    }
    Command::Set {
      id,
      field,
      value,
      clear,
    } => {
      let parsed = if clear {
        FieldValue::Null
      } else {
        let raw = value.ok_or_else(|| eyre!("missing VALUE (or pass --clear)"))?;
        let ty = service.field_type(&field)?;
        FieldValue::parse(&raw, ty)?
      };
      service.set_field(id, &field, parsed)?;
    }
    Command::Update {
      id,
      name,
      title,
      division,
      salary,
      pay_type,
    } => {
      let mut employee = service.get(id)?;
      employee.base = Employee {
        id,
        name,
        title,
        division,
        salary,
        pay_type,
      };
      // Base-only update; dynamic fields are written via `set`.
      employee.fields.clear();
      service.update(&employee)?;
    }
    Command::Delete { id } => {
      service.delete(id)?;
    }
    Command::AddColumn {
      name,
      r#type,
      default,
    } => {
      let ty: FieldType = r#type.into();
      let default = default
        .map(|raw| FieldValue::parse(&raw, ty))
        .transpose()?;
      service.add_column(&name, ty, default.as_ref())?;
    }
    Command::Columns => {
      // Pick up columns added out of band since the service started.
      service.refresh_catalog()?;
      for name in service.known_fields()? {
        println!("{}\t{}", name, service.field_type(&name)?);
      }
    }
    Command::Search {
      value,
      field,
      pattern,
    } => {
      let field = field
        .or_else(|| config.business_key.clone())
        .ok_or_else(|| eyre!("no --field given and no business_key configured"))?;

      let matches = if field.eq_ignore_ascii_case("name") {
        // Base-record search; the name column is always matched by substring.
        service.search_by_name(&value)?
      } else {
        match service.field_type(&field) {
          // A field that does not exist matches nothing.
          Err(staffdb::Error::ColumnNotFound(_)) => Vec::new(),
          Err(e) => return Err(e.into()),
          Ok(ty) => {
            let (needle, mode) = if pattern {
              (FieldValue::Text(value), MatchMode::Pattern)
            } else {
              (FieldValue::parse(&value, ty)?, MatchMode::Exact)
            };
            service.search_by_field(&field, &needle, mode)?
          }
        }
      };
      print_employees(&matches, json)?;
    }
    Command::Raise { min, max, percent } => {
      let changed = service.raise_salaries(min, max, percent)?;
      println!("updated {} employees", changed);
    }
    Command::Report { by } => {
      let group = match by {
        ReportArg::Title => GroupBy::Title,
        ReportArg::Division => GroupBy::Division,
      };
      let totals = service.total_pay_by(group)?;
      if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
      } else {
        for (key, total) in totals {
          println!("{}\t{:.2}", key, total);
        }
      }
    }
  }
  Ok(())
}

/// Parse repeated `NAME=VALUE` arguments, typing each value by its column.
fn parse_field_args(
  service: &EmployeeService,
  args: &[String],
) -> Result<BTreeMap<String, FieldValue>> {
  let mut fields = BTreeMap::new();
  for arg in args {
    let (name, raw) = arg
      .split_once('=')
      .ok_or_else(|| eyre!("expected NAME=VALUE, got '{}'", arg))?;
    let ty = service.field_type(name)?;
    fields.insert(name.to_string(), FieldValue::parse(raw, ty)?);
  }
  Ok(fields)
}

fn print_employees(employees: &[DynamicEmployee], json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(employees)?);
  } else {
    for employee in employees {
      println!("{}", employee);
    }
  }
  Ok(())
}
