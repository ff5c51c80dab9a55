use std::fs;
use std::path::{Path, PathBuf};

use dbtgen::prelude::*;
use pretty_assertions::assert_eq;

const COLUMNS: [&str; 12] = [
    "canmanageclients",
    "currencycode",
    "customerid",
    "datetimezone",
    "name",
    "testaccount",
    "_sdc_batched_at",
    "_sdc_customer_id",
    "_sdc_extracted_at",
    "_sdc_received_at",
    "_sdc_sequence",
    "_sdc_table_version",
];

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).expect("Failed to read file")
}

fn options(drop_metadata: bool) -> DbtGenConfig {
    DbtGenConfig::builder().drop_metadata(drop_metadata).build()
}

#[test]
fn test_extract_base_model() {
    let columns = extract(&read(fixture("test_sql_file.sql"))).expect("Failed to extract columns");
    let names: Vec<&str> = columns.iter().map(|c| c.source_name.as_str()).collect();
    assert_eq!(names, COLUMNS.to_vec());
    assert_eq!(columns.iter().filter(|c| c.is_metadata).count(), 6);
}

#[test]
fn test_transform_drop_metadata() {
    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("transformed.sql");

    let spec = TransformSpec::load(fixture("test_transform.yml")).expect("Failed to load transforms");
    let processor = ModelProcessor::from_config(spec, Dialect::Generic, &options(true));
    processor
        .process_file(&fixture("test_sql_file.sql"), &output)
        .expect("Failed to transform model");

    assert_eq!(
        read(&output),
        read(fixture("expected/transformed__drop_metadata.sql"))
    );
}

#[test]
fn test_transform_keep_metadata() {
    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("transformed.sql");

    let spec = TransformSpec::load(fixture("test_transform.yml")).expect("Failed to load transforms");
    let processor = ModelProcessor::from_config(spec, Dialect::Generic, &options(false));
    processor
        .process_file(&fixture("test_sql_file.sql"), &output)
        .expect("Failed to transform model");

    assert_eq!(
        read(&output),
        read(fixture("expected/transformed__keep_metadata.sql"))
    );
}

#[test]
fn test_bigquery_heuristics_on_base_model() {
    let config = DbtGenConfig::builder()
        .drop_metadata(false)
        .id_as_int(true)
        .convert_timestamp(true)
        .leading_commas(true)
        .build();
    let processor = ModelProcessor::from_config(TransformSpec::new(), Dialect::BigQuery, &config);
    let sql = processor
        .process_sql(&read(fixture("test_sql_file.sql")))
        .expect("Failed to transform model");

    assert!(sql.contains(
        "    select
        canmanageclients
        , currencycode
        , cast(customerid as int64) as customerid
        , datetimezone
        , name
        , testaccount
        , cast(_sdc_batched_at as timestamp) as _sdc_batched_at
        , cast(_sdc_customer_id as int64) as _sdc_customer_id
        , cast(_sdc_extracted_at as timestamp) as _sdc_extracted_at
        , cast(_sdc_received_at as timestamp) as _sdc_received_at
        , _sdc_sequence
        , _sdc_table_version

    from source"
    ));

    // Re-reading the output sees the same columns in the same order.
    let names: Vec<String> = extract(&sql)
        .unwrap()
        .into_iter()
        .map(|c| c.source_name)
        .collect();
    assert_eq!(names, COLUMNS.to_vec());
}

#[test]
fn test_snowflake_split_and_rules() {
    let model = "select\n    CustomerID,\n    currencyCode,\n    UpdatedAt as updated_at,\n    _fivetran_synced\nfrom {{ source('crm', 'accounts') }}\n";
    let spec = TransformSpec::from_yaml("cast:\n  updated_at: timestamp\n").unwrap();
    let config = DbtGenConfig::builder()
        .split_columns(true)
        .id_as_int(true)
        .convert_timestamp(true)
        .build();

    let processor = ModelProcessor::from_config(spec, Dialect::Snowflake, &config);
    assert_eq!(
        processor.process_sql(model).unwrap(),
        "select\n    cast(customerid as integer) as customer_id,\n    currencycode as currency_code,\n    cast(UpdatedAt as timestamp_ntz) as updated_at\nfrom {{ source('crm', 'accounts') }}\n"
    );
}

#[test]
fn test_drop_every_column_is_an_error() {
    let spec = TransformSpec::from_yaml(
        "drop:\n  - canmanageclients\n  - currencycode\n  - customerid\n  - datetimezone\n  - name\n  - testaccount\n",
    )
    .unwrap();
    let processor = ModelProcessor::from_config(spec, Dialect::Generic, &options(true));
    let err = processor
        .process_sql(&read(fixture("test_sql_file.sql")))
        .unwrap_err();
    assert!(matches!(err, DbtGenError::EmptyProjection { dropped: 12 }));
}

#[test]
fn test_conflicting_transform_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transforms.yml");
    fs::write(&path, "rename:\n  customerid: customer_id\ndrop:\n  - customerid\n").unwrap();

    let err = TransformSpec::load(&path).unwrap_err();
    assert!(err.to_string().contains("transforms.yml"));
    assert!(matches!(err.root(), DbtGenError::InvalidTransformSpec(_)));
}

#[tokio::test]
async fn test_process_dir_reports_each_file() {
    let models = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::copy(fixture("test_sql_file.sql"), models.path().join("accounts.sql")).unwrap();
    fs::write(models.path().join("broken.sql"), "select a, b from (t").unwrap();
    fs::write(models.path().join("README.md"), "not a model").unwrap();

    let spec = TransformSpec::load(fixture("test_transform.yml")).unwrap();
    let processor = ModelProcessor::from_config(spec, Dialect::Generic, &options(true));
    let report = processor
        .process_dir(models.path(), output.path(), false)
        .await
        .expect("Failed to process directory");

    assert!(!report.is_success());
    assert_eq!(report.written, vec![output.path().join("accounts.sql")]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].to_string().contains("broken.sql"));
    assert!(matches!(report.failed[0].root(), DbtGenError::MalformedInput { .. }));

    assert_eq!(
        read(output.path().join("accounts.sql")),
        read(fixture("expected/transformed__drop_metadata.sql"))
    );
    assert!(!output.path().join("broken.sql").exists());
    assert!(!output.path().join("README.md").exists());
}

#[tokio::test]
async fn test_process_dir_is_order_independent() {
    let models = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let base = read(fixture("test_sql_file.sql"));
    for name in ["c.sql", "a.sql", "b.sql"] {
        fs::write(models.path().join(name), &base).unwrap();
    }

    let processor = ModelProcessor::new(TransformSpec::new(), Dialect::Generic);
    let report = processor
        .process_dir(models.path(), output.path(), true)
        .await
        .unwrap();

    assert!(report.is_success());
    let written: Vec<PathBuf> = ["a.sql", "b.sql", "c.sql"]
        .iter()
        .map(|n| output.path().join(n))
        .collect();
    assert_eq!(report.written, written);

    let first = read(&written[0]);
    assert!(written.iter().all(|p| read(p) == first));
}
