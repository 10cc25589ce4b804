//! Integration tests for drivelens-caption
//!
//! Uses wiremock to simulate the model API and verifies end-to-end
//! behavior of captioning and embedding.


mod test_caption;
mod test_embed;
