mod concat_folding;
mod constant_folding;
mod pipeline;
