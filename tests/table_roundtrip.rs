//! @UTF round trips over generated schemas.

use acb::utf::{Field, Table, Value};
use acb::ValueType;
use proptest::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Column {
    U8,
    U16,
    I32,
    U64,
    F32,
    Text,
    Data,
}

impl Column {
    fn value_type(self) -> ValueType {
        match self {
            Column::U8 => ValueType::U8,
            Column::U16 => ValueType::U16,
            Column::I32 => ValueType::I32,
            Column::U64 => ValueType::U64,
            Column::F32 => ValueType::F32,
            Column::Text => ValueType::String,
            Column::Data => ValueType::Blob,
        }
    }
}

type Seed = (u64, String, Vec<u8>);

const MAX_COLUMNS: usize = 6;

fn cell(column: Column, seed: &Seed) -> Value {
    match column {
        Column::U8 => Value::U8(seed.0 as u8),
        Column::U16 => Value::U16(seed.0 as u16),
        Column::I32 => Value::I32(seed.0 as i32),
        Column::U64 => Value::U64(seed.0),
        Column::F32 => Value::F32((seed.0 % 100_000) as f32 / 8.0),
        Column::Text => Value::string(&seed.1),
        Column::Data => Value::bytes(seed.2.clone()),
    }
}

fn column() -> impl Strategy<Value = Column> {
    prop_oneof![
        Just(Column::U8),
        Just(Column::U16),
        Just(Column::I32),
        Just(Column::U64),
        Just(Column::F32),
        Just(Column::Text),
        Just(Column::Data),
    ]
}

fn seed() -> impl Strategy<Value = Seed> {
    (any::<u64>(), "[a-z_]{0,8}", proptest::collection::vec(any::<u8>(), 0..24))
}

fn build(columns: &[(Column, bool)], defaults: &[Seed], rows: &[Vec<Seed>]) -> Table {
    let mut table = Table::new("Generated");
    for (i, (column, defaulted)) in columns.iter().enumerate() {
        let name = format!("f{}", i);
        let field = if *defaulted && *column != Column::Data {
            Field::defaulted(&name, cell(*column, &defaults[i]))
        } else {
            Field::per_row(&name, column.value_type())
        };
        table.add_field(field).unwrap();
    }
    let names: Vec<String> = (0..columns.len()).map(|i| format!("f{}", i)).collect();
    for row in rows {
        let values: Vec<(&str, Value)> = columns
            .iter()
            .enumerate()
            .filter(|(_, (column, defaulted))| !*defaulted || *column == Column::Data)
            .map(|(i, (column, _))| (names[i].as_str(), cell(*column, &row[i])))
            .collect();
        table.add_row(&values).unwrap();
    }
    table
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_serialize_parse_serialize(
        columns in proptest::collection::vec((column(), any::<bool>()), 1..=MAX_COLUMNS),
        defaults in proptest::collection::vec(seed(), MAX_COLUMNS),
        rows in proptest::collection::vec(proptest::collection::vec(seed(), MAX_COLUMNS), 0..6),
    ) {
        let table = build(&columns, &defaults, &rows);
        let bytes = table.to_bytes().unwrap();
        prop_assert_eq!(bytes.len() % 4, 0);

        let parsed = Table::parse(&bytes).unwrap();
        prop_assert_eq!(&parsed, &table);
        prop_assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_set_keeps_other_rows(
        rows in 2usize..6,
        target in 0usize..6,
        default in any::<u16>(),
        value in any::<u16>(),
    ) {
        let target = target % rows;
        let mut table = Table::new("Promote");
        table.add_field(Field::defaulted("shared", Value::U16(default))).unwrap();
        table.add_field(Field::per_row("own", ValueType::U32)).unwrap();
        for i in 0..rows {
            table.add_row(&[("own", Value::U32(i as u32))]).unwrap();
        }

        table.set(target, "shared", Value::U16(value)).unwrap();
        for row in 0..rows {
            let expected = if row == target { value } else { default };
            prop_assert_eq!(table.uint(row, "shared").unwrap(), Some(expected as u64));
        }
        let parsed = Table::parse(&table.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(parsed, table);
    }
}

#[test]
fn test_nested_table_roundtrip() {
    let mut inner = Table::new("Inner");
    inner.add_field(Field::per_row("Name", ValueType::String)).unwrap();
    inner.add_row(&[("Name", Value::string("kick"))]).unwrap();

    let mut outer = Table::new("Outer");
    outer.add_field(Field::per_row("Child", ValueType::Blob)).unwrap();
    outer.add_field(Field::absent("Unused", ValueType::U32)).unwrap();
    outer.add_row(&[("Child", Value::Blob(acb::Blob::from_table(inner)))]).unwrap();

    let bytes = outer.to_bytes().unwrap();
    let parsed = Table::parse(&bytes).unwrap();
    let child = parsed.table(0, "Child").unwrap().unwrap();
    assert_eq!(child.string(0, "Name").unwrap().unwrap(), "kick");
    assert!(parsed.get(0, "Unused").unwrap().is_none());
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}
