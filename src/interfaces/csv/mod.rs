pub mod rental_writer;
