mod application;
mod presentation;

use carvegen_core::error::Result;

fn main() -> Result<()> {
    application::run()
}
