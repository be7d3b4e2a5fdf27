use crate::domain::rental::Rental;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct RentalRow {
    id: u64,
    user: u64,
    bike: Option<u64>,
    status: String,
    started_at: String,
    ended_at: Option<String>,
    fee: String,
}

impl From<&Rental> for RentalRow {
    fn from(rental: &Rental) -> Self {
        Self {
            id: rental.id,
            user: rental.user,
            bike: rental.resource,
            status: rental.status().to_string(),
            started_at: rental.started_at.to_rfc3339(),
            ended_at: rental.ended_at.map(|t| t.to_rfc3339()),
            fee: rental.fee.to_string(),
        }
    }
}

/// Writes rentals as CSV, one row per rental, header first.
pub struct RentalWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RentalWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(sink),
        }
    }

    pub fn write_rentals<'a>(
        &mut self,
        rentals: impl IntoIterator<Item = &'a Rental>,
    ) -> Result<()> {
        for rental in rentals {
            self.writer.serialize(RentalRow::from(rental))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
