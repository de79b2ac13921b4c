pub mod ec2;
pub mod gce;
