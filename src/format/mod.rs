pub mod dpak;
pub mod musc;
pub mod xm;
