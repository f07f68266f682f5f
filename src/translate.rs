use std::fmt::Display;

/// Interface language of messages and step descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Lang {
    #[default]
    En,
    Es,
    Ca,
}

/// Message catalog for one run. Keys are the English templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Translator {
    lang: Lang,
}

// { English, Spanish, Catalan }
const MESSAGES: &[[&str; 3]] = &[
    ["Execution Error", "Error de ejecución", "Error d'execució"],
    ["Compilation Error", "Error de compilación", "Error de compilació"],
    // evaluation errors
    [
        "The variable '%s' does not exist.",
        "La variable '%s' no existe.",
        "La variable '%s' no existeix.",
    ],
    [
        "The variable '%s' is not declared.",
        "La variable '%s' no está declarada.",
        "La variable '%s' no està declarada.",
    ],
    [
        "The variable referred to no longer exists.",
        "La variable a la que se refiere ya no existe.",
        "La variable a què es refereix ja no existeix.",
    ],
    [
        "The type '%s' does not exist.",
        "El tipo '%s' no existe.",
        "El tipus '%s' no existeix.",
    ],
    [
        "The type '%s' cannot be constructed with arguments.",
        "El tipo '%s' no se puede construir con argumentos.",
        "El tipus '%s' no es pot construir amb arguments.",
    ],
    [
        "Brace lists can only initialize a declaration.",
        "Las listas entre llaves sólo pueden inicializar una declaración.",
        "Les llistes entre claus només poden inicialitzar una declaració.",
    ],
    [
        "A reference must be initialized with a variable.",
        "Una referencia debe inicializarse con una variable.",
        "Una referència s'ha d'inicialitzar amb una variable.",
    ],
    [
        "The condition in a '%s' must be a value of type 'bool'.",
        "La condición de un '%s' debe ser un valor de tipo 'bool'.",
        "La condició a un '%s' ha de ser un valor de tipus 'bool'.",
    ],
    [
        "A conditional expression must have a condition of type 'bool'.",
        "Una expresión condicional debe tener una condición de tipo 'bool'.",
        "Una expressió condicional ha de tenir una condició de tipus 'bool'.",
    ],
    [
        "The operands of '%s' are incompatible.",
        "Los operandos de '%s' son incompatibles.",
        "Els operands de '%s' són incompatibles.",
    ],
    [
        "The operands of '%s' are not of type 'bool'.",
        "Los operandos de '%s' no son de tipo 'bool'.",
        "Els operands de '%s' no són de tipus 'bool'.",
    ],
    [
        "The operands of '%s' are not of the same type.",
        "Los operandos de '%s' no son del mismo tipo.",
        "Els operands de '%s' no són del mateix tipus.",
    ],
    [
        "Division by zero.",
        "División por cero.",
        "Divisió per zero.",
    ],
    [
        "You are trying to assign to something that is not a variable.",
        "Intentas asignar sobre algo que no es una variable.",
        "Intentes assignar sobre quelcom que no és una variable.",
    ],
    [
        "To use '%s' you must put a variable on the left.",
        "Para usar '%s' se debe poner una variable a la izquierda.",
        "Per fer servir '%s' cal posar una variable a l'esquerra.",
    ],
    [
        "The constant '%s' cannot be modified.",
        "La constante '%s' no se puede modificar.",
        "La constant '%s' no es pot modificar.",
    ],
    [
        "The assignment cannot be done because the types are incompatible ('%s' and '%s').",
        "La asignación no se puede hacer porque los tipos no son compatibles ('%s' y '%s').",
        "L'assignació no es pot fer perquè els tipus no són compatibles ('%s' i '%s').",
    ],
    [
        "Reading with 'cin' requires variables.",
        "La lectura con 'cin' requiere que pongas variables.",
        "La lectura amb 'cin' requereix que hi posis variables.",
    ],
    [
        "Error when reading input",
        "Error al leer de la entrada",
        "Error al llegir de l'entrada",
    ],
    [
        "Error when writing output",
        "Error al escribir en la salida",
        "Error a l'escriure a la sortida",
    ],
    [
        "Parameter %d requires a variable.",
        "En el parámetro %d se requiere una variable.",
        "Al paràmetre %d cal una variable.",
    ],
    [
        "Wrong number of arguments when calling '%s'.",
        "Error en el número de argumentos al llamar a '%s'.",
        "Error en el nombre d'arguments en cridar '%s'.",
    ],
    [
        "Argument %d is not compatible with the parameter type ('%s' expected, '%s' found).",
        "El argumento %d no es compatible con el tipo del parámetro (se esperaba '%s' y es '%s').",
        "L'argument %d no és compatible amb el tipus del paràmetre (s'esperava '%s' i és '%s').",
    ],
    [
        "The function '%s' should return a '%s'.",
        "La función '%s' debería devolver un '%s'.",
        "La funció '%s' hauria de retornar un '%s'.",
    ],
    [
        "Calling something other than a function.",
        "Se llama a algo que no es una función.",
        "Es crida quelcom que no és una funció.",
    ],
    [
        "Index expressions must be used on arrays or vectors.",
        "Las expresiones de índice deben usarse sobre tablas o vectores.",
        "Les expressions d'índex s'han de fer servir sobre taules o vectors.",
    ],
    [
        "The index in an array access must be an integer.",
        "El índice en un acceso a tabla debe ser un entero.",
        "L'índex en un accés a taula ha de ser un enter.",
    ],
    [
        "Cell %d does not exist.",
        "La casilla %d no existe.",
        "La casella %d no existeix.",
    ],
    [
        "The vector is empty.",
        "El vector está vacío.",
        "El vector és buit.",
    ],
    [
        "This object has no field '%s'.",
        "Este objeto no tiene un campo '%s'.",
        "Aquest objecte no té un camp '%s'.",
    ],
    [
        "The size of an array must be an integer.",
        "El tamaño de una tabla debe ser un entero.",
        "La mida d'una taula ha de ser un enter.",
    ],
    [
        "The size of an array must be a positive integer.",
        "El tamaño de una tabla debe ser un entero positivo.",
        "La mida d'una taula ha de ser un enter positiu.",
    ],
    [
        "Too many initializers for '%s'.",
        "Demasiados valores iniciales para '%s'.",
        "Massa valors inicials per a '%s'.",
    ],
    [
        "The 'main' function does not exist.",
        "La función 'main' no existe.",
        "La funció 'main' no existeix.",
    ],
    [
        "'main' is not a function.",
        "'main' no es una función.",
        "'main' no és una funció.",
    ],
    [
        "The sign change for '%s' makes no sense.",
        "El cambio de signo para '%s' no tiene sentido.",
        "El canvi de signe per a '%s' no té sentit.",
    ],
    [
        "You must increment a variable, not a value.",
        "Hay que incrementar una variable, no un valor.",
        "Cal incrementar una variable, no un valor.",
    ],
    [
        "You are incrementing a value of type '%s'.",
        "Estás incrementando un valor de tipo '%s'.",
        "Estàs incrementant un valor de tipus '%s'.",
    ],
    [
        "To negate an expression it must be of type 'bool'.",
        "Para negar una expresión ésta debe ser de tipo 'bool'.",
        "Per negar una expressió aquesta ha de ser de tipus 'bool'.",
    ],
    // stepper
    [
        "The program begins.",
        "Empieza el programa.",
        "Comença el programa.",
    ],
    [
        "The program ends.",
        "Termina el programa.",
        "Acaba el programa.",
    ],
    [
        "The condition is 'true', we take the first branch.",
        "La condición vale 'true', seguimos por la primera rama.",
        "La condició val 'true', seguim per la primera branca.",
    ],
    [
        "The condition is 'false', we take the second branch.",
        "La condición vale 'false', seguimos por la segunda rama.",
        "La condició val 'false', seguim per la segona branca.",
    ],
    [
        "The condition is 'false', we continue.",
        "La condición vale 'false', continuamos.",
        "La condició val 'false', continuem.",
    ],
    [
        "The condition is 'false', we exit the %s.",
        "La condición vale 'false', salimos del %s.",
        "La condició és 'false', sortim del %s.",
    ],
    [
        "The condition is 'true', we enter the %s.",
        "La condición vale 'true', entramos en el %s.",
        "La condició val 'true', entrem al %s.",
    ],
    ["%s is returned.", "Se retorna %s.", "Es retorna %s."],
    [
        "We return from the function.",
        "Volvemos de la función.",
        "Tornem de la funció.",
    ],
    [
        "Some output is written.",
        "Se escribe a la salida.",
        "S'escriu a la sortida.",
    ],
    [
        "Some input is read.",
        "Se lee de la entrada.",
        "Es llegeix de l'entrada.",
    ],
    [
        "The expression evaluated to %s.",
        "La expresión ha dado %s.",
        "L'expressió ha donat %s.",
    ],
    [
        "We assign the value.",
        "Asignamos el valor.",
        "Assignem el valor.",
    ],
    [
        "We evaluate the %s parameter.",
        "Se evalúa el %s parámetro.",
        "S'avalua el %s paràmetre.",
    ],
    ["first", "primer", "primer"],
    ["second", "segundo", "segon"],
    ["third", "tercer", "tercer"],
    ["fourth", "cuarto", "quart"],
    ["fifth", "quinto", "cinquè"],
    ["sixth", "sexto", "sisè"],
    ["seventh", "séptimo", "setè"],
    [
        "We evaluate parameter number %d.",
        "Se evalúa el parámetro número %d.",
        "S'avalua el paràmetre número %d.",
    ],
    [
        "We jump to function '%s'.",
        "Saltamos a la función '%s'.",
        "Saltem a la funció '%s'.",
    ],
    [
        "Variable '%s' is declared.",
        "Se declara la variable '%s'.",
        "Es declara la variable '%s'.",
    ],
    [
        "Variables %s are declared.",
        "Se declaran las variables %s.",
        "Es declaren les variables %s.",
    ],
    [" and ", " y ", " i "],
];

const ORDINALS: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh",
];

impl Translator {
    pub fn new(lang: Lang) -> Self {
        Self { lang }
    }

    pub fn lang(&self) -> Lang {
        self.lang
    }

    /// Look up `key` and substitute `%s`/`%d`/`%c` with `args` in order.
    pub fn tr(&self, key: &str, args: &[&dyn Display]) -> String {
        let template = self.lookup(key);
        let mut out = String::with_capacity(template.len());
        let mut args = args.iter();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '%' {
                if let Some('s' | 'd' | 'c') = chars.peek() {
                    chars.next();
                    if let Some(a) = args.next() {
                        out.push_str(&a.to_string());
                    }
                    continue;
                }
            }
            out.push(c);
        }
        out
    }

    fn lookup<'k>(&self, key: &'k str) -> &'k str {
        let col = match self.lang {
            Lang::En => return key,
            Lang::Es => 1,
            Lang::Ca => 2,
        };
        MESSAGES
            .iter()
            .find(|row| row[0] == key)
            .map(|row| row[col])
            .unwrap_or(key)
    }

    /// "We evaluate the second parameter." style status for argument `index` (0-based).
    pub fn parameter_status(&self, index: usize) -> String {
        match ORDINALS.get(index) {
            Some(ord) => {
                let ord = self.tr(ord, &[]);
                self.tr("We evaluate the %s parameter.", &[&ord])
            }
            None => self.tr("We evaluate parameter number %d.", &[&(index + 1)]),
        }
    }

    /// Joins names as `'a', 'b' and 'c'` in the current language.
    pub fn join_names(&self, names: &[&str]) -> String {
        let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
        match quoted.split_last() {
            None => String::new(),
            Some((last, [])) => last.clone(),
            Some((last, rest)) => format!("{}{}{}", rest.join(", "), self.tr(" and ", &[]), last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_is_identity_with_substitution() {
        let t = Translator::default();
        assert_eq!(
            t.tr("The variable '%s' does not exist.", &[&"x"]),
            "The variable 'x' does not exist."
        );
    }

    #[test]
    fn spanish_and_catalan_lookup() {
        let es = Translator::new(Lang::Es);
        assert_eq!(es.tr("The program begins.", &[]), "Empieza el programa.");
        let ca = Translator::new(Lang::Ca);
        assert_eq!(
            ca.tr("We jump to function '%s'.", &[&"f"]),
            "Saltem a la funció 'f'."
        );
    }

    #[test]
    fn unknown_keys_fall_back_to_english() {
        let es = Translator::new(Lang::Es);
        assert_eq!(es.tr("no such %d key", &[&4]), "no such 4 key");
    }

    #[test]
    fn ordinals_and_fallback() {
        let t = Translator::default();
        assert_eq!(t.parameter_status(1), "We evaluate the second parameter.");
        assert_eq!(t.parameter_status(7), "We evaluate parameter number 8.");
        let es = Translator::new(Lang::Es);
        assert_eq!(es.parameter_status(0), "Se evalúa el primer parámetro.");
    }

    #[test]
    fn joins_names() {
        let t = Translator::default();
        assert_eq!(t.join_names(&["a"]), "'a'");
        assert_eq!(t.join_names(&["a", "b", "c"]), "'a', 'b' and 'c'");
        assert_eq!(Translator::new(Lang::Ca).join_names(&["a", "b"]), "'a' i 'b'");
    }
}
