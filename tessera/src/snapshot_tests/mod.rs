mod errors;
mod rendering;
mod utils;
