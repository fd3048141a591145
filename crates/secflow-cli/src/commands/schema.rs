use anyhow::Result;

pub fn run() -> Result<()> {
    println!("{}", secflow_core::schema::generate_output_schema());
    Ok(())
}
