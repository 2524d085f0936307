//! Builds the `gad-runtime` module resolver the CLI hands to the VM,
//! wiring up `-safe` and `-disabled-modules` (spec.md §6).

use gad_runtime::BuiltinModuleResolver;

pub fn build(safe: bool, disabled_modules: &[String]) -> BuiltinModuleResolver {
    let resolver = if safe { BuiltinModuleResolver::safe() } else { BuiltinModuleResolver::new() };
    resolver.with_disabled(disabled_modules.iter().cloned())
}
