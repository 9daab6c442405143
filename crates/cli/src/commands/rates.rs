//! Shipping rate table commands.

use std::path::Path;

use souq_storefront::pricing::ShippingRateTable;

use super::CommandError;

/// Load a rate file and list what it contains.
pub fn check(path: &Path) -> Result<(), CommandError> {
    let table = ShippingRateTable::load(path)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{} regions in {}", table.len(), path.display());
        for (region, rate) in table.regions() {
            println!(
                "  {region}: base {} / free from {}",
                rate.base_rate, rate.free_shipping_threshold
            );
        }
    }

    Ok(())
}
