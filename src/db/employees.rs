//! Base CRUD over the fixed employee columns. Dynamic columns are never
//! touched here; they belong to `db::fields`.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::params;

use super::fields::escape_like;
use super::Store;
use crate::error::{Error, Result};
use crate::model::Employee;

#[derive(Clone)]
pub struct EmployeeStore {
  store: Arc<Store>,
}

impl EmployeeStore {
  pub fn new(store: Arc<Store>) -> Self {
    Self { store }
  }

  /// Insert a new employee and return the store-assigned identifier. The
  /// `id` field of the input is ignored.
  pub fn insert(&self, employee: &Employee) -> Result<i64> {
    let conn = self.store.conn()?;
    conn.execute(
      "INSERT INTO employees (name, title, division, salary, pay_type)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      params![
        employee.name,
        employee.title,
        employee.division,
        employee.salary,
        employee.pay_type
      ],
    )?;
    Ok(conn.last_insert_rowid())
  }

  pub fn update(&self, employee: &Employee) -> Result<()> {
    let conn = self.store.conn()?;
    let changed = conn.execute(
      "UPDATE employees SET name = ?1, title = ?2, division = ?3, salary = ?4, pay_type = ?5
       WHERE id = ?6",
      params![
        employee.name,
        employee.title,
        employee.division,
        employee.salary,
        employee.pay_type,
        employee.id
      ],
    )?;
    if changed == 0 {
      return Err(Error::EmployeeNotFound(employee.id));
    }
    Ok(())
  }

  /// Delete the row. Dynamic column values go with it; no separate cleanup.
  pub fn delete(&self, id: i64) -> Result<()> {
    let conn = self.store.conn()?;
    let changed = conn.execute("DELETE FROM employees WHERE id = ?1", params![id])?;
    if changed == 0 {
      return Err(Error::EmployeeNotFound(id));
    }
    Ok(())
  }

  pub fn get(&self, id: i64) -> Result<Employee> {
    let conn = self.store.conn()?;
    conn
      .query_row(
        "SELECT id, name, title, division, salary, pay_type FROM employees WHERE id = ?1",
        params![id],
        row_to_employee,
      )
      .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::EmployeeNotFound(id),
        other => other.into(),
      })
  }

  pub fn get_all(&self) -> Result<Vec<Employee>> {
    let conn = self.store.conn()?;
    let mut stmt = conn
      .prepare("SELECT id, name, title, division, salary, pay_type FROM employees ORDER BY id")?;
    let rows = stmt.query_map([], row_to_employee)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
  }

  /// Employees whose name contains `pattern`, case-insensitive.
  pub fn search_by_name(&self, pattern: &str) -> Result<Vec<Employee>> {
    let conn = self.store.conn()?;
    let mut stmt = conn.prepare(
      "SELECT id, name, title, division, salary, pay_type FROM employees
       WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id",
    )?;
    let needle = format!("%{}%", escape_like(pattern));
    let rows = stmt.query_map(params![needle], row_to_employee)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
  }

  pub fn list_ids(&self) -> Result<Vec<i64>> {
    let conn = self.store.conn()?;
    let mut stmt = conn.prepare("SELECT id FROM employees ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
  }

  pub fn count_all(&self) -> Result<i64> {
    let conn = self.store.conn()?;
    conn
      .query_row("SELECT count(*) FROM employees", [], |row| row.get(0))
      .map_err(Into::into)
  }

  /// Raise salaries by `percent` for every employee whose salary falls in
  /// `[min, max)`. Returns the number of employees affected.
  pub fn raise_salaries(&self, min: f64, max: f64, percent: f64) -> Result<usize> {
    let conn = self.store.conn()?;
    let changed = conn.execute(
      "UPDATE employees SET salary = salary * (1.0 + ?1 / 100.0)
       WHERE salary >= ?2 AND salary < ?3",
      params![percent, min, max],
    )?;
    Ok(changed)
  }

  /// Total salary grouped by the given base column expression.
  pub(crate) fn total_pay_grouped(&self, column: &str) -> Result<BTreeMap<String, f64>> {
    debug_assert!(column == "title" || column == "division");
    let conn = self.store.conn()?;
    let sql = format!(
      "SELECT {col}, sum(salary) FROM employees GROUP BY {col}",
      col = column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
    rows.collect::<rusqlite::Result<BTreeMap<_, _>>>().map_err(Into::into)
  }
}

fn row_to_employee(row: &rusqlite::Row<'_>) -> rusqlite::Result<Employee> {
  Ok(Employee {
    id: row.get(0)?,
    name: row.get(1)?,
    title: row.get(2)?,
    division: row.get(3)?,
    salary: row.get(4)?,
    pay_type: row.get(5)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample(name: &str, division: &str, salary: f64) -> Employee {
    Employee {
      id: 0,
      name: name.into(),
      title: "Engineer".into(),
      division: division.into(),
      salary,
      pay_type: "salaried".into(),
    }
  }

  fn open() -> EmployeeStore {
    EmployeeStore::new(Arc::new(Store::open_in_memory().unwrap()))
  }

  #[test]
  fn test_insert_assigns_ids_and_get_roundtrips() {
    let store = open();
    let id = store.insert(&sample("Ada", "IT", 120_000.0)).unwrap();
    assert!(id > 0);

    let fetched = store.get(id).unwrap();
    assert_eq!(fetched.name, "Ada");
    assert_eq!(fetched.id, id);
  }

  #[test]
  fn test_get_missing_is_not_found() {
    let store = open();
    assert!(matches!(store.get(99), Err(Error::EmployeeNotFound(99))));
  }

  #[test]
  fn test_update_and_delete_report_missing_rows() {
    let store = open();
    let mut emp = sample("Ada", "IT", 100.0);
    emp.id = 41;
    assert!(matches!(store.update(&emp), Err(Error::EmployeeNotFound(41))));
    assert!(matches!(store.delete(41), Err(Error::EmployeeNotFound(41))));

    let id = store.insert(&emp).unwrap();
    emp.id = id;
    emp.division = "Research".into();
    store.update(&emp).unwrap();
    assert_eq!(store.get(id).unwrap().division, "Research");

    store.delete(id).unwrap();
    assert_eq!(store.count_all().unwrap(), 0);
  }

  #[test]
  fn test_search_by_name_is_substring_and_case_insensitive() {
    let store = open();
    let ada = store.insert(&sample("Ada Lovelace", "IT", 100.0)).unwrap();
    store.insert(&sample("Bob", "HR", 100.0)).unwrap();
    let pct = store.insert(&sample("Mr. 100%", "IT", 100.0)).unwrap();

    let hits = store.search_by_name("love").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, ada);

    // LIKE metacharacters in the pattern are literals.
    let hits = store.search_by_name("100%").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, pct);

    assert!(store.search_by_name("zelda").unwrap().is_empty());
  }

  #[test]
  fn test_raise_salaries_in_range() {
    let store = open();
    store.insert(&sample("A", "IT", 50_000.0)).unwrap();
    store.insert(&sample("B", "IT", 80_000.0)).unwrap();

    let changed = store.raise_salaries(40_000.0, 60_000.0, 10.0).unwrap();
    assert_eq!(changed, 1);

    let all = store.get_all().unwrap();
    assert!((all[0].salary - 55_000.0).abs() < 0.01);
    assert!((all[1].salary - 80_000.0).abs() < 0.01);
  }

  #[test]
  fn test_total_pay_grouped_by_division() {
    let store = open();
    store.insert(&sample("A", "IT", 100.0)).unwrap();
    store.insert(&sample("B", "IT", 50.0)).unwrap();
    store.insert(&sample("C", "HR", 75.0)).unwrap();

    let totals = store.total_pay_grouped("division").unwrap();
    assert_eq!(totals["IT"], 150.0);
    assert_eq!(totals["HR"], 75.0);
  }
}
